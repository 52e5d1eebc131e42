//! Execution records for runs, legs, and steps.
//!
//! Records are created when scheduling begins and mutated only by the
//! step scheduler. A leg never touches another leg's records.

use crate::ids::{LegId, RunId};
use crate::spec::Leg;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Excluded by a `when` clause or short-circuited by an earlier failure.
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded
                | StepStatus::Failed
                | StepStatus::Skipped
                | StepStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// The pipeline's trigger filter excluded this event entirely.
    Skipped,
}

/// Per (leg, step) execution record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionRecord {
    pub step_name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    /// Tail of the captured combined output, secrets masked.
    pub output: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl ExecutionRecord {
    pub fn pending(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Pending,
            exit_code: None,
            output: Vec::new(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LegRecord {
    pub id: LegId,
    pub leg: Leg,
    pub status: LegStatus,
    pub steps: Vec<ExecutionRecord>,
    /// Set when the build/test steps succeeded but publishing failed.
    /// Kept separate so reporting never conflates the two.
    pub publish_error: Option<String>,
}

impl LegRecord {
    pub fn new(leg: Leg, step_names: &[String]) -> Self {
        Self {
            id: LegId::new(),
            leg,
            status: LegStatus::Pending,
            steps: step_names
                .iter()
                .map(|n| ExecutionRecord::pending(n.clone()))
                .collect(),
            publish_error: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&ExecutionRecord> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn succeeded(&self) -> bool {
        self.status == LegStatus::Succeeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunRecord {
    pub id: RunId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub legs: Vec<LegRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Process-level exit code: 0 iff every leg succeeded, or the run
    /// was filtered out entirely.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded | RunStatus::Skipped => 0,
            _ => 1,
        }
    }

    pub fn leg(&self, display_name: &str) -> Option<&LegRecord> {
        self.legs
            .iter()
            .find(|l| l.leg.display_name() == display_name)
    }
}
