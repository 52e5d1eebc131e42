//! Step scheduling and leg execution.
//!
//! One independent execution flow per leg: steps run strictly in
//! declaration order inside a leg, distinct legs run concurrently up to
//! a configured limit. The only shared state between legs is the
//! read-only pipeline spec and trigger context.

use crate::conditions::clauses_match;
use crate::matrix::expand;
use crate::publisher::Publisher;
use chrono::Utc;
use flywheel_core::interpolation::{self, MaterializedStep, mask_secrets};
use flywheel_core::ports::{SandboxExecutor, SandboxRequest, SandboxResult, SecretProvider};
use flywheel_core::record::{LegRecord, LegStatus, RunRecord, RunStatus, StepStatus};
use flywheel_core::spec::{Leg, PipelineSpec};
use flywheel_core::trigger::TriggerContext;
use flywheel_core::{Error, Result, RunId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on legs executing concurrently.
    pub max_parallel_legs: usize,
    /// When true, the first failed leg cancels in-flight siblings.
    /// Cancellation is observed at step boundaries, never mid-command.
    pub fail_fast: bool,
    /// Output lines retained per step record.
    pub output_tail: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_legs: 4,
            fail_fast: false,
            output_tail: 100,
        }
    }
}

/// Drives a pipeline run: expansion, filtering, materialization, and
/// per-leg execution against the injected adapters.
#[derive(Clone)]
pub struct Scheduler {
    sandbox: Arc<dyn SandboxExecutor>,
    secrets: Arc<dyn SecretProvider>,
    publisher: Option<Arc<Publisher>>,
    config: SchedulerConfig,
}

/// One step of a leg's plan. Excluded steps keep their slot so records
/// line up with declaration order.
struct PlannedStep {
    name: String,
    materialized: Option<MaterializedStep>,
}

struct LegPlan {
    leg: Leg,
    steps: Vec<PlannedStep>,
}

impl Scheduler {
    pub fn new(sandbox: Arc<dyn SandboxExecutor>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self {
            sandbox,
            secrets,
            publisher: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    /// Execute the whole run. Spec and substitution problems surface here
    /// as errors before any sandbox is started; step failures surface in
    /// the returned records, scoped to their leg.
    pub async fn run(&self, spec: &PipelineSpec, trigger: &TriggerContext) -> Result<RunRecord> {
        spec.validate()?;
        let started_at = Utc::now();

        // Pipeline-level trigger filter, evaluated before expansion.
        if !clauses_match(&spec.when, trigger, &Leg::new(0, Default::default())) {
            info!(pipeline = %spec.name, event = %trigger.event, "Run skipped by trigger filter");
            return Ok(RunRecord {
                id: RunId::new(),
                pipeline_name: spec.name.clone(),
                status: RunStatus::Skipped,
                legs: Vec::new(),
                started_at,
                completed_at: Some(started_at),
                duration_ms: Some(0),
            });
        }

        let legs = expand(spec.matrix.as_ref())?;
        info!(pipeline = %spec.name, legs = legs.len(), event = %trigger.event, "Run started");

        let plans = self.plan(spec, trigger, legs)?;
        self.preflight_secrets(&plans).await?;

        let trigger = Arc::new(trigger.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_legs.max(1)));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut join_set = JoinSet::new();
        for plan in plans {
            let worker = self.clone();
            let trigger = Arc::clone(&trigger);
            let semaphore = Arc::clone(&semaphore);
            let cancel_rx = cancel_rx.clone();
            let cancel_tx = cancel_tx.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let record = worker.run_leg(plan, &trigger, &cancel_rx).await;
                if worker.config.fail_fast && record.status != LegStatus::Succeeded {
                    let _ = cancel_tx.send(true);
                }
                record
            });
        }

        let mut legs = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(record) => legs.push(record),
                Err(e) => return Err(Error::Sandbox(format!("leg task panicked: {}", e))),
            }
        }
        legs.sort_by_key(|record| record.leg.index);

        let status = if legs.iter().all(|l| l.status == LegStatus::Succeeded) {
            RunStatus::Succeeded
        } else if legs.iter().any(|l| l.status == LegStatus::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };

        let completed_at = Utc::now();
        let record = RunRecord {
            id: RunId::new(),
            pipeline_name: spec.name.clone(),
            status,
            legs,
            started_at,
            completed_at: Some(completed_at),
            duration_ms: Some((completed_at - started_at).num_milliseconds().max(0) as u64),
        };
        info!(pipeline = %spec.name, status = ?record.status, "Run finished");
        Ok(record)
    }

    /// Filter and materialize every leg's step list up front, so an
    /// unresolvable reference fails the run before any sandbox starts.
    fn plan(
        &self,
        spec: &PipelineSpec,
        trigger: &TriggerContext,
        legs: Vec<Leg>,
    ) -> Result<Vec<LegPlan>> {
        legs.into_iter()
            .map(|leg| {
                let steps = spec
                    .steps
                    .iter()
                    .map(|step| {
                        let materialized = if clauses_match(&step.when, trigger, &leg) {
                            Some(interpolation::materialize(step, &leg, trigger)?)
                        } else {
                            debug!(leg = %leg.display_name(), step = %step.name, "Excluded by when clause");
                            None
                        };
                        Ok(PlannedStep {
                            name: step.name.clone(),
                            materialized,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(LegPlan { leg, steps })
            })
            .collect()
    }

    /// Every referenced secret must be declared before execution begins.
    /// Values are still resolved per step, immediately before launch.
    async fn preflight_secrets(&self, plans: &[LegPlan]) -> Result<()> {
        for plan in plans {
            for planned in &plan.steps {
                let Some(step) = &planned.materialized else {
                    continue;
                };
                for secret_name in step.secret_env.values() {
                    if !self.secrets.exists(secret_name).await? {
                        return Err(Error::SecretNotFound(secret_name.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_leg(
        &self,
        plan: LegPlan,
        trigger: &TriggerContext,
        cancel: &watch::Receiver<bool>,
    ) -> LegRecord {
        let step_names: Vec<String> = plan.steps.iter().map(|s| s.name.clone()).collect();
        let mut record = LegRecord::new(plan.leg.clone(), &step_names);
        record.status = LegStatus::Running;
        let leg_name = plan.leg.display_name();
        info!(leg = %leg_name, "Leg started");

        let mut failed_step: Option<usize> = None;
        let mut cancelled = false;

        for (i, planned) in plan.steps.iter().enumerate() {
            let step_record = &mut record.steps[i];

            if cancelled || (failed_step.is_none() && *cancel.borrow()) {
                cancelled = true;
                step_record.status = StepStatus::Cancelled;
                continue;
            }
            if failed_step.is_some() {
                step_record.status = StepStatus::Skipped;
                continue;
            }
            let Some(step) = &planned.materialized else {
                step_record.status = StepStatus::Skipped;
                continue;
            };

            step_record.status = StepStatus::Running;
            step_record.started_at = Some(Utc::now());
            info!(leg = %leg_name, step = %step.name, image = %step.image, "Step started");

            let outcome = self.run_commands(step, &step.commands).await;

            let completed = Utc::now();
            step_record.completed_at = Some(completed);
            step_record.duration_ms = step_record
                .started_at
                .map(|s| (completed - s).num_milliseconds().max(0) as u64);

            match outcome {
                Ok((result, secret_values)) => {
                    step_record.exit_code = Some(result.exit_code);
                    step_record.output = self.tail(&result.output, &secret_values);
                    if result.success() {
                        step_record.status = StepStatus::Succeeded;
                    } else {
                        warn!(leg = %leg_name, step = %step.name, exit_code = result.exit_code, "Step failed");
                        step_record.status = StepStatus::Failed;
                        failed_step = Some(i);
                    }
                }
                Err(e) => {
                    warn!(leg = %leg_name, step = %step.name, error = %e, "Step errored");
                    step_record.output.push(e.to_string());
                    step_record.status = StepStatus::Failed;
                    failed_step = Some(i);
                }
            }
        }

        if cancelled && failed_step.is_none() {
            info!(leg = %leg_name, "Leg cancelled");
            record.status = LegStatus::Cancelled;
            return record;
        }

        if let Some(i) = failed_step {
            // The diagnostic action is always attempted on the failure
            // path, before the leg reports.
            if let Some(step) = &plan.steps[i].materialized
                && !step.on_failure.is_empty()
            {
                let diagnostics = self.run_commands(step, &step.on_failure).await;
                match diagnostics {
                    Ok((result, secret_values)) => {
                        let mut lines = self.tail(&result.output, &secret_values);
                        record.steps[i].output.append(&mut lines);
                    }
                    Err(e) => {
                        warn!(leg = %leg_name, step = %step.name, error = %e, "Diagnostic action failed");
                    }
                }
            }
            record.status = LegStatus::Failed;
            return record;
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&plan.leg, trigger).await {
                // Reported as the leg's final error; the build steps above
                // stay Succeeded.
                warn!(leg = %leg_name, error = %e, "Publish failed");
                record.publish_error = Some(e.to_string());
                record.status = LegStatus::Failed;
                return record;
            }
        }

        info!(leg = %leg_name, "Leg succeeded");
        record.status = LegStatus::Succeeded;
        record
    }

    /// Resolve the step's secrets and run `commands` in its sandbox.
    /// Returns the resolved secret values alongside the result so captured
    /// output can be masked; they are never cached.
    async fn run_commands(
        &self,
        step: &MaterializedStep,
        commands: &[String],
    ) -> Result<(SandboxResult, Vec<String>)> {
        let mut environment = step.environment.clone();
        let mut secret_values = Vec::new();
        for (env_name, secret_name) in &step.secret_env {
            let secret = self.secrets.get(secret_name).await?;
            secret_values.push(secret.value.clone());
            environment.insert(env_name.clone(), secret.value);
        }

        let request = SandboxRequest {
            image: step.image.clone(),
            commands: commands.to_vec(),
            environment,
            working_dir: step.working_dir.clone().map(PathBuf::from),
        };

        let result = self.sandbox.execute(request).await?;
        Ok((result, secret_values))
    }

    fn tail(&self, output: &[String], secret_values: &[String]) -> Vec<String> {
        let skip = output.len().saturating_sub(self.config.output_tail);
        output[skip..]
            .iter()
            .map(|line| mask_secrets(line, secret_values))
            .collect()
    }
}
