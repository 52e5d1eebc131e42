//! Container image registry backend.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{PushImageOptions, TagImageOptions};
use flywheel_core::ports::ImageRegistry;
use flywheel_core::{Error, Result};
use futures::StreamExt;
use tracing::{debug, info};

/// Pushes locally built images through the Docker daemon. The image is
/// tagged with the fully rendered repository/tag pair first, so a
/// retried publish re-pushes the same reference.
pub struct DockerRegistry {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl DockerRegistry {
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Publish(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self {
            docker,
            credentials: None,
        })
    }

    pub fn with_docker(docker: Docker) -> Self {
        Self {
            docker,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(DockerCredentials {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        });
        self
    }
}

#[async_trait]
impl ImageRegistry for DockerRegistry {
    async fn push(&self, repository: &str, tag: &str, image: &str) -> Result<()> {
        debug!(image, repository, tag, "Tagging image");
        self.docker
            .tag_image(
                image,
                Some(TagImageOptions {
                    repo: repository.to_string(),
                    tag: tag.to_string(),
                }),
            )
            .await
            .map_err(|e| Error::Publish(format!("Failed to tag {}: {}", image, e)))?;

        let mut stream = self.docker.push_image(
            repository,
            Some(PushImageOptions {
                tag: tag.to_string(),
            }),
            self.credentials.clone(),
        );

        while let Some(info) = stream.next().await {
            let info = info.map_err(|e| {
                Error::Publish(format!("Failed to push {}:{}: {}", repository, tag, e))
            })?;
            if let Some(err) = info.error {
                return Err(Error::Publish(format!(
                    "Failed to push {}:{}: {}",
                    repository, tag, err
                )));
            }
        }

        info!(repository, tag, "Pushed image");
        Ok(())
    }
}
