//! Container runtime trait and container specifications.
//!
//! The job engine drives containers through this seam; the production
//! implementation lives in `remotebuild-executor` and talks to Docker.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::Result;

/// A bind mount into the build container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Absolute host path.
    pub host: PathBuf,
    /// Mount point inside the container.
    pub container: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn read_write(host: PathBuf, container: impl Into<String>) -> Self {
        Self {
            host,
            container: container.into(),
            read_only: false,
        }
    }
}

/// Specification for creating a build container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image reference to run.
    pub image: String,
    /// Environment in `KEY=VALUE` form.
    pub env: Vec<String>,
    /// Bind mounts (bind, rprivate propagation).
    pub mounts: Vec<BindMount>,
    /// Remove the container once it exits.
    pub auto_remove: bool,
}

/// Writer target for `stream_logs`.
pub type LogWriter<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Thin abstraction over an external container runtime.
///
/// Implementations must be concurrency-safe; the driver handle is shared
/// between the worker and request handlers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `image` if it is not present locally. Idempotent.
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Create a container, returning its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    /// Stop a container, giving it `grace_secs` to exit before the kill.
    async fn stop(&self, id: &str, grace_secs: i64) -> Result<()>;

    async fn pause(&self, id: &str) -> Result<()>;

    async fn resume(&self, id: &str) -> Result<()>;

    /// Block until the container exits; returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64>;

    /// Copy currently-available stdout+stderr to `out`, not following.
    ///
    /// `since` is a unix-seconds lower bound, `tail` limits output to the
    /// last N lines. Returns the number of bytes written.
    async fn stream_logs(
        &self,
        id: &str,
        since: i64,
        tail: Option<&str>,
        out: LogWriter<'_>,
    ) -> Result<u64>;
}
