//! Container-based step execution using Docker.

use crate::{SandboxConfig, shell_script};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use flywheel_core::ports::{SandboxExecutor, SandboxRequest, SandboxResult};
use flywheel_core::{Error, Result};
use futures::StreamExt;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Runs each step's command list inside a fresh Docker container keyed
/// by the step's image reference.
pub struct ContainerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl ContainerSandbox {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Sandbox(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker, config })
    }

    pub fn with_docker(docker: Docker, config: SandboxConfig) -> Self {
        Self { docker, config }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| Error::Sandbox(format!("Failed to pull {}: {}", image, e)))?;
        }
        Ok(())
    }

    /// Force-remove a container, on every exit path including timeouts.
    async fn remove_container(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(name, Some(options)).await {
            warn!(container = %name, error = %e, "Failed to remove container");
        }
    }
}

#[async_trait]
impl SandboxExecutor for ContainerSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult> {
        let container_name = format!("flywheel-{}", uuid::Uuid::new_v4());

        info!(
            image = %request.image,
            container = %container_name,
            commands = request.commands.len(),
            "Starting container execution"
        );

        self.pull_image(&request.image).await?;

        let env: Vec<String> = request
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let working_dir = request
            .working_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "/workspace".to_string());

        let container_config = Config {
            image: Some(request.image.clone()),
            cmd: Some(vec![
                "sh".to_string(),
                "-ec".to_string(),
                shell_script(&request.commands),
            ]),
            env: Some(env),
            working_dir: Some(working_dir),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![format!(
                    "{}:/workspace",
                    self.config.workspace.display()
                )]),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: &container_name,
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to start container: {}", e)))?;

        let log_options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut output = Vec::new();
        let mut log_stream = self.docker.logs(&container_name, Some(log_options));
        while let Some(log_result) = log_stream.next().await {
            match log_result {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push(String::from_utf8_lossy(&message).trim_end().to_string());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };

        let wait_result = if let Some(timeout_secs) = self.config.timeout_seconds {
            match timeout(
                Duration::from_secs(timeout_secs),
                self.docker
                    .wait_container(&container_name, Some(wait_options))
                    .next(),
            )
            .await
            {
                Ok(Some(result)) => result,
                Ok(None) => {
                    self.remove_container(&container_name).await;
                    return Err(Error::Sandbox(
                        "Container wait returned no result".to_string(),
                    ));
                }
                Err(_) => {
                    warn!(timeout_secs, "Container execution timed out");
                    let _ = self
                        .docker
                        .kill_container::<String>(&container_name, None)
                        .await;
                    self.remove_container(&container_name).await;
                    return Err(Error::Sandbox("Container execution timed out".to_string()));
                }
            }
        } else {
            match self
                .docker
                .wait_container(&container_name, Some(wait_options))
                .next()
                .await
            {
                Some(result) => result,
                None => {
                    self.remove_container(&container_name).await;
                    return Err(Error::Sandbox(
                        "Container wait returned no result".to_string(),
                    ));
                }
            }
        };

        let exit_code = match wait_result {
            Ok(exit) => exit.status_code as i32,
            Err(e) => {
                self.remove_container(&container_name).await;
                return Err(Error::Sandbox(format!("Container wait failed: {}", e)));
            }
        };

        self.remove_container(&container_name).await;

        debug!(container = %container_name, exit_code, "Container execution completed");

        Ok(SandboxResult { exit_code, output })
    }
}
