//! CLI command definitions.

use clap::{Args, Subcommand};
use flywheel_core::trigger::EventKind;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a pipeline
    Run(RunArgs),

    /// Validate a pipeline file
    Validate {
        /// Path to pipeline file
        #[arg(default_value = "flywheel.yaml")]
        file: String,
    },

    /// Show the legs a pipeline expands into
    Legs {
        /// Path to pipeline file
        #[arg(default_value = "flywheel.yaml")]
        file: String,
    },

    /// Print the JSON schema for pipeline files
    Schema,
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to pipeline file
    #[arg(default_value = "flywheel.yaml")]
    pub file: String,

    /// Trigger event kind
    #[arg(long, default_value = "push")]
    pub event: EventKind,

    /// Branch the run is for
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Tag the run is for
    #[arg(long)]
    pub tag: Option<String>,

    /// Commit the run is for
    #[arg(long, default_value = "local")]
    pub commit: String,

    /// Run steps as host processes instead of containers
    #[arg(long)]
    pub local: bool,

    /// Maximum legs running concurrently
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Cancel remaining legs after the first failed leg
    #[arg(long)]
    pub fail_fast: bool,

    /// JSON file of secret name/value pairs (defaults to environment
    /// variables)
    #[arg(long)]
    pub secrets_file: Option<PathBuf>,

    /// Extra substitution variables
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Directory published artifacts are written into
    #[arg(long, default_value = ".flywheel/artifacts")]
    pub artifacts_dir: PathBuf,
}
