//! Command handlers.

use crate::commands::RunArgs;
use console::style;
use flywheel_core::record::{LegStatus, RunRecord, RunStatus, StepStatus};
use flywheel_core::spec::PipelineSpec;
use flywheel_core::trigger::{EventKind, TriggerContext};
use flywheel_engine::{Publisher, Scheduler, SchedulerConfig, expand};
use flywheel_publish::{DockerRegistry, FsObjectStore};
use flywheel_sandbox::{ContainerSandbox, ProcessSandbox, SandboxConfig};
use flywheel_secrets::{EnvProvider, FileProvider};
use std::sync::Arc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_spec(path: &str) -> Result<PipelineSpec, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(PipelineSpec::from_yaml(&content)?)
}

/// Validate a pipeline file.
pub async fn validate(path: &str) -> CliResult {
    let spec = load_spec(path)?;
    spec.validate()?;
    let legs = expand(spec.matrix.as_ref())?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        spec.name
    );
    println!("  Steps: {}", spec.steps.len());
    println!("  Legs: {}", legs.len());
    Ok(())
}

/// Print the legs a pipeline expands into.
pub async fn legs(path: &str) -> CliResult {
    let spec = load_spec(path)?;
    spec.validate()?;
    let legs = expand(spec.matrix.as_ref())?;

    for leg in &legs {
        println!("{:>3}  {}", leg.index, leg.display_name());
    }
    Ok(())
}

/// Print the pipeline file schema as JSON.
pub fn schema() -> CliResult {
    let schema = flywheel_core::spec::schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Execute a pipeline and print a per-leg summary.
pub async fn run(args: RunArgs) -> CliResult {
    let spec = load_spec(&args.file)?;

    let mut trigger = TriggerContext {
        event: args.event,
        branch: args.branch,
        tag: args.tag,
        commit: args.commit,
        extra: Default::default(),
    };
    for pair in &args.vars {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(format!("invalid --var \"{}\", expected KEY=VALUE", pair).into());
        };
        trigger.extra.insert(key.to_string(), value.to_string());
    }
    if args.event == EventKind::Tag && trigger.tag.is_none() {
        return Err("--event tag requires --tag".into());
    }

    let sandbox: Arc<dyn flywheel_core::ports::SandboxExecutor> = if args.local {
        Arc::new(ProcessSandbox::default())
    } else {
        Arc::new(ContainerSandbox::new(SandboxConfig::default())?)
    };

    let secrets: Arc<dyn flywheel_core::ports::SecretProvider> = match &args.secrets_file {
        Some(path) => Arc::new(FileProvider::load_from_file(path).await?),
        None => Arc::new(EnvProvider::default()),
    };

    let config = SchedulerConfig {
        max_parallel_legs: args.max_parallel,
        fail_fast: args.fail_fast,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(sandbox, secrets).with_config(config);

    if let Some(publish) = spec.publish.clone() {
        let workspace = std::env::current_dir()?;
        let mut publisher = Publisher::new(publish.clone(), workspace);
        if publish.object.is_some() {
            publisher =
                publisher.with_object_store(Arc::new(FsObjectStore::new(&args.artifacts_dir)));
        }
        if publish.image.is_some() {
            publisher = publisher.with_registry(Arc::new(DockerRegistry::new()?));
        }
        scheduler = scheduler.with_publisher(publisher);
    }

    let record = scheduler.run(&spec, &trigger).await?;
    print_summary(&record);
    std::process::exit(record.exit_code());
}

fn print_summary(record: &RunRecord) {
    println!();
    for leg in &record.legs {
        let marker = match leg.status {
            LegStatus::Succeeded => style("✓").green(),
            LegStatus::Failed => style("✗").red(),
            LegStatus::Cancelled => style("!").yellow(),
            _ => style("-").dim(),
        };
        println!("{} {}", marker, style(leg.leg.display_name()).bold());

        for step in &leg.steps {
            let (marker, label) = match step.status {
                StepStatus::Succeeded => (style("✓").green(), "ok"),
                StepStatus::Failed => (style("✗").red(), "failed"),
                StepStatus::Skipped => (style("-").dim(), "skipped"),
                StepStatus::Cancelled => (style("!").yellow(), "cancelled"),
                _ => (style("?").dim(), "pending"),
            };
            let duration = step
                .duration_ms
                .map(|ms| format!(" ({}ms)", ms))
                .unwrap_or_default();
            println!("    {} {} {}{}", marker, step.step_name, label, duration);
        }

        if let Some(err) = &leg.publish_error {
            println!("    {} publish: {}", style("✗").red(), err);
        }
    }

    println!();
    match record.status {
        RunStatus::Succeeded => println!("{} Run succeeded", style("✓").green()),
        RunStatus::Skipped => println!("{} Run skipped by trigger filter", style("-").dim()),
        _ => println!("{} Run {:?}", style("✗").red(), record.status),
    }
}
