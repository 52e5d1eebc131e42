//! Scripted executor for tests.
//!
//! Behaves like a real sandbox from the scheduler's point of view:
//! deterministic exit codes keyed by command substring, optional
//! per-command latency, and a log of every request it received.

use async_trait::async_trait;
use flywheel_core::ports::{SandboxExecutor, SandboxRequest, SandboxResult};
use flywheel_core::{Error, Result};
use std::sync::Mutex;
use tokio::time::Duration;

#[derive(Default)]
pub struct FakeSandbox {
    failures: Mutex<Vec<(String, i32)>>,
    errors: Mutex<Vec<String>>,
    delays: Mutex<Vec<(String, Duration)>>,
    requests: Mutex<Vec<SandboxRequest>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any request whose commands contain `needle` exits with `exit_code`.
    pub fn fail_on(&self, needle: impl Into<String>, exit_code: i32) {
        self.failures
            .lock()
            .expect("lock")
            .push((needle.into(), exit_code));
    }

    /// Any request whose commands contain `needle` fails with a sandbox
    /// error (image pull/start failure).
    pub fn error_on(&self, needle: impl Into<String>) {
        self.errors.lock().expect("lock").push(needle.into());
    }

    /// Delay matching requests, to order legs deterministically in
    /// cancellation tests.
    pub fn delay_on(&self, needle: impl Into<String>, delay: Duration) {
        self.delays
            .lock()
            .expect("lock")
            .push((needle.into(), delay));
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.requests.lock().expect("lock").clone()
    }

    /// Flattened command lists of every request, in arrival order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .flat_map(|r| r.commands)
            .collect()
    }

    fn matches(commands: &[String], needle: &str) -> bool {
        commands.iter().any(|c| c.contains(needle))
    }
}

#[async_trait]
impl SandboxExecutor for FakeSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult> {
        let delay = self
            .delays
            .lock()
            .expect("lock")
            .iter()
            .find(|(needle, _)| Self::matches(&request.commands, needle))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.requests.lock().expect("lock").push(request.clone());

        let errored = self
            .errors
            .lock()
            .expect("lock")
            .iter()
            .any(|needle| Self::matches(&request.commands, needle));
        if errored {
            return Err(Error::Sandbox(format!(
                "cannot start sandbox for {}",
                request.image
            )));
        }

        let exit_code = self
            .failures
            .lock()
            .expect("lock")
            .iter()
            .find(|(needle, _)| Self::matches(&request.commands, needle))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        // Echo the commands and environment back as captured output so
        // tests can assert on what the sandbox saw.
        let mut output: Vec<String> = request.commands.clone();
        output.extend(
            request
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}", k, v)),
        );

        Ok(SandboxResult { exit_code, output })
    }
}
