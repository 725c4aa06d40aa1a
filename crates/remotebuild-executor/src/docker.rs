//! Docker implementation of the container driver.

use async_trait::async_trait;
use bollard::container::{
    Config, LogOutput, LogsOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{
    HostConfig, Mount, MountBindOptions, MountBindOptionsPropagationEnum, MountTypeEnum,
};
use bollard::Docker;
use futures::StreamExt;
use remotebuild_core::runtime::{ContainerRuntime, ContainerSpec, LogWriter};
use remotebuild_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Container driver talking to the local Docker daemon.
///
/// The handle is cheap to clone and safe to share between the worker and
/// request handlers.
#[derive(Clone)]
pub struct DockerDriver {
    docker: Docker,
}

impl DockerDriver {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Whether the daemon is reachable.
    pub async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    async fn has_image(&self, image: &str) -> Result<bool> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::Runtime(e.to_string()))?;

        Ok(images
            .iter()
            .any(|summary| summary.repo_tags.iter().any(|tag| tag == image)))
    }

    fn mounts_of(spec: &ContainerSpec) -> Vec<Mount> {
        spec.mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.container.clone()),
                source: Some(m.host.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                bind_options: Some(MountBindOptions {
                    propagation: Some(MountBindOptionsPropagationEnum::RPRIVATE),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for DockerDriver {
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.has_image(image).await? {
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull_stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    debug!(image = %image, error = %e, "Pull failed");
                    return Err(Error::ImageNotFound(image.to_string()));
                }
            }
        }

        debug!(image = %image, "Image pulled");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let host_config = HostConfig {
            mounts: Some(Self::mounts_of(spec)),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .map_err(|e| Error::Runtime(format!("failed to create container: {e}")))?;

        debug!(container = %container.id, image = %spec.image, "Created container");
        Ok(container.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Runtime(format!("failed to start container: {e}")))
    }

    async fn stop(&self, id: &str, grace_secs: i64) -> Result<()> {
        info!(container = %id, "Stopping container");
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_secs }))
            .await
            .map_err(|e| Error::Runtime(format!("failed to stop container: {e}")))
    }

    async fn pause(&self, id: &str) -> Result<()> {
        self.docker
            .pause_container(id)
            .await
            .map_err(|e| Error::Runtime(format!("failed to pause container: {e}")))
    }

    async fn resume(&self, id: &str) -> Result<()> {
        self.docker
            .unpause_container(id)
            .await
            .map_err(|e| Error::Runtime(format!("failed to unpause container: {e}")))
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // The daemon reports a non-zero exit through an error body but
            // still carries the code; surface it as a plain exit code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Runtime(format!("wait failed: {e}"))),
            None => Err(Error::Runtime("wait stream ended unexpectedly".into())),
        }
    }

    async fn stream_logs(
        &self,
        id: &str,
        since: i64,
        tail: Option<&str>,
        out: LogWriter<'_>,
    ) -> Result<u64> {
        let options = LogsOptions::<String> {
            follow: false,
            stdout: true,
            stderr: true,
            since,
            tail: tail.unwrap_or("all").to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let message = match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => message,
                Ok(LogOutput::StdIn { .. }) => continue,
                Err(e) => return Err(Error::Runtime(format!("log stream error: {e}"))),
            };

            out.write_all(&message).await?;
            written += message.len() as u64;
        }

        out.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotebuild_core::runtime::BindMount;
    use std::path::PathBuf;

    fn spec_with_mounts() -> ContainerSpec {
        ContainerSpec {
            image: "img:v1.0".to_string(),
            env: vec!["AURPackage=vim".to_string()],
            mounts: vec![
                BindMount::read_write(PathBuf::from("/tmp/remotebuild_x"), "/home/builduser"),
                BindMount::read_write(PathBuf::from("/var/cache/ccache"), "/ccache"),
            ],
            auto_remove: true,
        }
    }

    #[test]
    fn mounts_are_rprivate_binds() {
        let mounts = DockerDriver::mounts_of(&spec_with_mounts());

        assert_eq!(mounts.len(), 2);
        for mount in &mounts {
            assert_eq!(mount.typ, Some(MountTypeEnum::BIND));
            assert_eq!(mount.read_only, Some(false));
            assert_eq!(
                mount.bind_options.as_ref().unwrap().propagation,
                Some(MountBindOptionsPropagationEnum::RPRIVATE)
            );
        }
        assert_eq!(mounts[0].target.as_deref(), Some("/home/builduser"));
        assert_eq!(mounts[1].target.as_deref(), Some("/ccache"));
    }
}

/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use remotebuild_core::runtime::BindMount;

    fn driver() -> DockerDriver {
        DockerDriver::new().expect("Should connect to Docker daemon")
    }

    #[tokio::test]
    #[ignore]
    async fn ensure_image_is_idempotent() {
        let driver = driver();
        driver.ensure_image("alpine:latest").await.expect("pull");
        driver.ensure_image("alpine:latest").await.expect("re-pull");
    }

    #[tokio::test]
    #[ignore]
    async fn missing_image_is_reported() {
        let driver = driver();
        let err = driver
            .ensure_image("remotebuild/does-not-exist:v0")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageNotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn container_lifecycle_and_exit_code() {
        let driver = driver();
        driver.ensure_image("alpine:latest").await.expect("pull");

        let scratch = tempfile::tempdir().expect("scratch dir");
        let spec = ContainerSpec {
            image: "alpine:latest".to_string(),
            env: vec!["MARKER=ok".to_string()],
            mounts: vec![BindMount::read_write(
                scratch.path().to_path_buf(),
                "/home/builduser",
            )],
            auto_remove: false,
        };

        let id = driver.create(&spec).await.expect("create");
        driver.start(&id).await.expect("start");
        let code = driver.wait(&id).await.expect("wait");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn logs_are_copied_to_writer() {
        let driver = driver();
        driver.ensure_image("alpine:latest").await.expect("pull");

        let spec = ContainerSpec {
            image: "alpine:latest".to_string(),
            env: vec![],
            mounts: vec![],
            auto_remove: false,
        };

        let id = driver.create(&spec).await.expect("create");
        driver.start(&id).await.expect("start");
        driver.wait(&id).await.expect("wait");

        let mut buf = Vec::new();
        driver
            .stream_logs(&id, 0, Some("20"), &mut buf)
            .await
            .expect("logs");
    }
}
