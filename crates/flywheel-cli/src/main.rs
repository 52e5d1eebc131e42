//! Flywheel CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "flywheel")]
#[command(author, version, about = "Flywheel pipeline runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handlers::run(args).await?,
        Commands::Validate { file } => handlers::validate(&file).await?,
        Commands::Legs { file } => handlers::legs(&file).await?,
        Commands::Schema => handlers::schema()?,
    }

    Ok(())
}
