//! One container execution.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remotebuild_core::args::ArgParser;
use remotebuild_core::resinfo::{parse_res_info, ResInfo};
use remotebuild_core::runtime::{BindMount, ContainerSpec, LogWriter};
use remotebuild_core::{Error, JobState, JobType, Result};
use remotebuild_db::BuildJobRecord;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Engine;

/// Mount point of the scratch directory inside the build container.
const BUILD_HOME: &str = "/home/builduser";

/// Mount point of the ccache directory inside the build container.
const CCACHE_MOUNT: &str = "/ccache";

/// Grace period in seconds when stopping a cancelled build's container.
const STOP_GRACE_SECS: i64 = 1;

/// A job which builds a package inside a container.
///
/// Transient state (cancel token, container id, start time) is re-created
/// whenever the job is loaded; only `state` is persisted.
pub struct BuildJob {
    pub id: i64,
    pub job_type: JobType,
    pub image: String,
    pub use_ccache: bool,
    state: Mutex<JobState>,
    container_id: Mutex<Option<String>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
}

impl BuildJob {
    pub fn from_record(record: &BuildJobRecord) -> Self {
        Self {
            id: record.id,
            job_type: record.job_type,
            image: record.image.clone(),
            use_ccache: record.use_ccache,
            state: Mutex::new(record.state),
            container_id: Mutex::new(None),
            started_at: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    /// Id of the currently-executing container, if one exists.
    pub fn container_id(&self) -> Option<String> {
        self.container_id.lock().clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock()
    }

    /// Signal cancellation. Latched; a second call is a no-op and never
    /// blocks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the build, racing it against the cancel signal.
    pub async fn run(
        &self,
        engine: &Engine,
        scratch_dir: &Path,
        parser: &ArgParser,
    ) -> Result<ResInfo> {
        debug!(build_job_id = self.id, "Run build job");

        let envs = match parser.parse_envs() {
            Ok(envs) => envs,
            Err(e) => {
                self.set_state(JobState::Failed);
                return Err(e);
            }
        };

        let build = self.build(engine, scratch_dir, envs);
        tokio::pin!(build);

        tokio::select! {
            result = &mut build => result,
            _ = self.cancel.cancelled() => {
                self.stop(engine).await;
                self.set_state(JobState::Cancelled);
                Err(Error::JobCancelled)
            }
        }
    }

    async fn build(
        &self,
        engine: &Engine,
        scratch_dir: &Path,
        envs: Vec<String>,
    ) -> Result<ResInfo> {
        if let Err(e) = engine.runtime().ensure_image(&self.image).await {
            self.set_state(JobState::Failed);
            return Err(e);
        }

        let mut mounts = vec![BindMount::read_write(scratch_dir.to_path_buf(), BUILD_HOME)];
        if self.use_ccache {
            if let Some(dir) = engine.ccache_dir() {
                mounts.push(BindMount::read_write(dir.to_path_buf(), CCACHE_MOUNT));
            }
        }

        let spec = ContainerSpec {
            image: self.image.clone(),
            env: envs,
            mounts,
            auto_remove: !engine.keep_build_container(),
        };

        let container = match engine.runtime().create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                self.set_state(JobState::Failed);
                return Err(e);
            }
        };

        // Track the container so a concurrent cancel can stop it.
        *self.container_id.lock() = Some(container.clone());
        self.set_state(JobState::Running);
        *self.started_at.lock() = Some(Utc::now());

        if let Err(e) = engine.runtime().start(&container).await {
            self.set_state(JobState::Failed);
            return Err(e);
        }

        let exit = engine.runtime().wait(&container).await;
        *self.container_id.lock() = None;

        let exit = match exit {
            Ok(code) => code,
            Err(e) => {
                self.set_state(JobState::Failed);
                return Err(e);
            }
        };

        if exit != 0 {
            self.set_state(JobState::Failed);
            return Err(Error::NonZeroExit(exit));
        }

        match parse_res_info(scratch_dir) {
            Ok(info) => {
                self.set_state(JobState::Done);
                Ok(info)
            }
            Err(e) => {
                self.set_state(JobState::Failed);
                Err(e)
            }
        }
    }

    /// Stop the current container, if any, with a short grace period.
    pub async fn stop(&self, engine: &Engine) {
        let Some(container) = self.container_id() else {
            return;
        };

        info!(container = %container, "Stopping container");
        if let Err(e) = engine.runtime().stop(&container, STOP_GRACE_SECS).await {
            debug!(container = %container, error = %e, "Stop failed");
        }
    }

    /// Pause the running container. Pausing an already-paused build is a
    /// no-op.
    pub async fn pause(&self, engine: &Engine) -> Result<()> {
        if self.state() == JobState::Paused {
            return Ok(());
        }

        let Some(container) = self.container_id() else {
            return Err(Error::JobNotRunning);
        };
        if self.state() != JobState::Running {
            return Err(Error::JobNotRunning);
        }

        engine.runtime().pause(&container).await?;
        self.set_state(JobState::Paused);
        Ok(())
    }

    /// Resume a paused container. Resuming a running build is a no-op.
    pub async fn resume(&self, engine: &Engine) -> Result<()> {
        if self.state() == JobState::Running {
            return Ok(());
        }

        let Some(container) = self.container_id() else {
            return Err(Error::JobNotRunning);
        };
        if self.state() != JobState::Paused {
            return Err(Error::JobNotRunning);
        }

        engine.runtime().resume(&container).await?;
        self.set_state(JobState::Running);
        Ok(())
    }

    /// Copy currently-available container logs to `out`.
    pub async fn get_logs(
        &self,
        engine: &Engine,
        since: i64,
        out: LogWriter<'_>,
        tail: Option<&str>,
    ) -> Result<u64> {
        if self.state() != JobState::Running {
            return Err(Error::JobNotRunning);
        }
        let Some(container) = self.container_id() else {
            return Err(Error::JobNotRunning);
        };

        engine.runtime().stream_logs(&container, since, tail, out).await
    }

    /// Snapshot of the persistable fields.
    pub fn record(&self, created_at: DateTime<Utc>) -> BuildJobRecord {
        BuildJobRecord {
            id: self.id,
            created_at,
            state: self.state(),
            job_type: self.job_type,
            image: self.image.clone(),
            use_ccache: self.use_ccache,
        }
    }
}
