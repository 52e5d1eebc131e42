//! Local process execution.
//!
//! Runs the command list as a strict shell script on the host. This is
//! a development convenience, not an isolation boundary; environment
//! entries overlay the parent environment.

use crate::{SandboxConfig, shell_script};
use async_trait::async_trait;
use flywheel_core::ports::{SandboxExecutor, SandboxRequest, SandboxResult};
use flywheel_core::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult> {
        let work_dir = request
            .working_dir
            .clone()
            .unwrap_or_else(|| self.config.workspace.clone());

        debug!(
            image = %request.image,
            commands = request.commands.len(),
            work_dir = %work_dir.display(),
            "Starting local execution"
        );

        let mut cmd = Command::new("sh");
        cmd.arg("-ec").arg(shell_script(&request.commands));
        cmd.current_dir(&work_dir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &request.environment {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().expect("stdout");
        let stderr = child.stderr.take().expect("stderr");

        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected
        });
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected
        });

        let status = if let Some(timeout_secs) = self.config.timeout_seconds {
            match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(res) => res?,
                Err(_) => {
                    warn!(timeout_secs, "Local execution timed out");
                    let _ = child.kill().await;
                    return Err(Error::Sandbox("Step timed out".to_string()));
                }
            }
        } else {
            child.wait().await?
        };

        let mut output = stdout_handle.await.unwrap_or_default();
        output.extend(stderr_handle.await.unwrap_or_default());

        Ok(SandboxResult {
            exit_code: status.code().unwrap_or(-1),
            output,
        })
    }
}
