//! The two-phase (build, then upload) composite job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remotebuild_core::args::{parse_args, serialize_args, ArgParser};
use remotebuild_core::runtime::LogWriter;
use remotebuild_core::{Error, JobState, Result};
use remotebuild_db::{HydratedJob, JobRecord};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::build_job::BuildJob;
use crate::engine::Engine;
use crate::upload_job::UploadJob;

/// Period of the log persister loop.
const PERSIST_PERIOD: Duration = Duration::from_secs(1);

/// Number of log lines the persister keeps.
const PERSIST_TAIL_LINES: &str = "20";

/// Bytes below which log snapshots accumulate instead of overwriting.
const PERSIST_ACCUMULATE_BYTES: usize = 20;

/// A job created by a user: one build followed by one upload, sharing a
/// scratch directory.
pub struct Job {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Scratch directory containing the build files.
    pub scratch_dir: PathBuf,
    pub args: HashMap<String, String>,
    pub build: BuildJob,
    pub upload: UploadJob,
    result: Mutex<String>,
    last_logs: Mutex<String>,
    cancelled: AtomicBool,
    /// Unix seconds of the last observed log request, for anti-replay.
    last_since: AtomicI64,
    persister_stop: CancellationToken,
}

impl Job {
    /// Re-create a runtime job from its persisted records, re-attaching the
    /// transient channels.
    pub fn from_hydrated(hydrated: &HydratedJob) -> Result<Self> {
        Ok(Self {
            id: hydrated.job.id,
            created_at: hydrated.job.created_at,
            scratch_dir: PathBuf::from(&hydrated.job.data_dir),
            args: parse_args(&hydrated.job.args)?,
            build: BuildJob::from_record(&hydrated.build),
            upload: UploadJob::from_record(&hydrated.upload),
            result: Mutex::new(hydrated.job.result.clone()),
            last_logs: Mutex::new(hydrated.job.last_logs.clone()),
            cancelled: AtomicBool::new(false),
            last_since: AtomicI64::new(-1),
            persister_stop: CancellationToken::new(),
        })
    }

    /// Aggregate state: the build state until the build is done, then the
    /// upload state.
    pub fn state(&self) -> JobState {
        if self.build.state() != JobState::Done {
            return self.build.state();
        }
        self.upload.state()
    }

    /// Set the state of the phase that is still pending.
    pub fn set_state(&self, state: JobState) {
        if self.build.state() != JobState::Done {
            self.build.set_state(state);
            return;
        }
        self.upload.set_state(state);
    }

    pub fn result(&self) -> String {
        self.result.lock().clone()
    }

    pub fn last_logs(&self) -> String {
        self.last_logs.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn arg_parser(&self) -> ArgParser {
        ArgParser::new(self.args.clone(), self.build.job_type)
    }

    /// Run the job through both phases. Terminal cleanup (stopping the log
    /// persister, removing the scratch directory, clearing the serialized
    /// args, persisting) happens on every exit path.
    pub async fn run(self: Arc<Self>, engine: Arc<Engine>) -> Result<()> {
        debug!(job_id = self.id, "Run job");

        if let Err(e) = engine.store().save_job(&self.record(false)).await {
            warn!(job_id = self.id, error = %e, "Failed to persist job");
        }

        let persister = tokio::spawn(log_persister(Arc::clone(&self), Arc::clone(&engine)));

        let result = self.run_phases(&engine).await;

        self.persister_stop.cancel();
        let _ = persister.await;
        self.cleanup(&engine).await;

        result
    }

    async fn run_phases(&self, engine: &Engine) -> Result<()> {
        let parser = self.arg_parser();

        let build = match self.build.run(engine, &self.scratch_dir, &parser).await {
            Ok(info) => info,
            Err(e) => {
                if !e.is_cancelled() {
                    self.set_state(JobState::Failed);
                    info!(job_id = self.id, error = %e, "Build failed");
                }
                return Err(e);
            }
        };

        if self.is_cancelled() {
            return Err(Error::JobCancelled);
        }

        if let Err(e) = self.upload.run(engine, &build, &parser).await {
            if !e.is_cancelled() {
                self.set_state(JobState::Failed);
                info!(job_id = self.id, error = %e, "Upload failed");
            }
            return Err(e);
        }

        *self.result.lock() = "Success".to_string();
        info!(job_id = self.id, "Job done");
        Ok(())
    }

    /// Cancel the job: wake the log persister, signal both sub-jobs, mark
    /// the job cancelled and clean up. Idempotent.
    pub async fn cancel(&self, engine: &Engine) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        self.persister_stop.cancel();
        self.build.cancel();
        self.upload.cancel();

        self.build.set_state(JobState::Cancelled);
        self.upload.set_state(JobState::Cancelled);
        *self.result.lock() = "Cancelled".to_string();

        self.cleanup(engine).await;
    }

    /// Mark the job failed and persist it; used by the worker's panic
    /// boundary.
    pub async fn mark_failed(&self, engine: &Engine) {
        self.set_state(JobState::Failed);
        self.persist(engine).await;
    }

    /// Remove the scratch directory (missing is fine), clear the serialized
    /// args and persist. Store errors are logged, never re-raised; the
    /// queue must make forward progress.
    async fn cleanup(&self, engine: &Engine) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_id = self.id, error = %e, "Failed to remove scratch dir");
            }
        }

        self.persist(engine).await;
    }

    async fn persist(&self, engine: &Engine) {
        if let Err(e) = engine.store().save_build_job(&self.build.record(self.created_at)).await {
            warn!(job_id = self.id, error = %e, "Failed to persist build job");
        }
        if let Err(e) = engine.store().save_upload_job(&self.upload.record(self.created_at)).await {
            warn!(job_id = self.id, error = %e, "Failed to persist upload job");
        }
        if let Err(e) = engine.store().save_job(&self.record(true)).await {
            warn!(job_id = self.id, error = %e, "Failed to persist job");
        }
    }

    /// Snapshot of the persistable fields. `clear_args` drops the
    /// serialized argument map, done at terminal cleanup.
    fn record(&self, clear_args: bool) -> JobRecord {
        let args = if clear_args {
            String::new()
        } else {
            serialize_args(&self.args).unwrap_or_default()
        };

        JobRecord {
            id: self.id,
            created_at: self.created_at,
            build_job_id: self.build.id,
            upload_job_id: self.upload.id,
            data_dir: self.scratch_dir.to_string_lossy().into_owned(),
            args,
            last_logs: self.last_logs(),
            result: self.result(),
        }
    }

    /// Write the job's live logs to `out`.
    ///
    /// With `anti_replay`, a request whose `since` is not newer than the
    /// last observed one returns silently; the observed value is then
    /// advanced to `now`.
    pub async fn get_logs(
        &self,
        engine: &Engine,
        now: DateTime<Utc>,
        since: i64,
        out: LogWriter<'_>,
        anti_replay: bool,
    ) -> Result<()> {
        if anti_replay && since <= self.last_since.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.last_since.store(now.timestamp(), Ordering::SeqCst);

        if self.state() != JobState::Running {
            return Err(Error::JobNotRunning);
        }

        if self.build.state() == JobState::Running {
            self.build.get_logs(engine, since, out, None).await?;
            return Ok(());
        }

        if self.upload.state() == JobState::Running {
            out.write_all(b"Uploading").await?;
            out.flush().await?;
            return Ok(());
        }

        Err(Error::NoLogsFound)
    }
}

/// Periodically snapshots the build's log tail into the job record while
/// the build is waiting or running.
async fn log_persister(job: Arc<Job>, engine: Arc<Engine>) {
    let mut seen_logs = false;

    loop {
        tokio::select! {
            _ = job.persister_stop.cancelled() => return,
            _ = tokio::time::sleep(PERSIST_PERIOD) => {}
        }

        if !matches!(job.build.state(), JobState::Waiting | JobState::Running) {
            return;
        }

        let mut buf = Vec::new();
        match job
            .build
            .get_logs(&engine, 0, &mut buf, Some(PERSIST_TAIL_LINES))
            .await
        {
            // The build has not been observed running yet; startup race.
            Err(Error::JobNotRunning) if !seen_logs => continue,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Log persister exiting");
                return;
            }
            Ok(0) => {}
            Ok(_) => {
                seen_logs = true;
                let snapshot = String::from_utf8_lossy(&buf).into_owned();
                let tail = {
                    let mut last = job.last_logs.lock();
                    if last.len() > PERSIST_ACCUMULATE_BYTES
                        && snapshot.len() > PERSIST_ACCUMULATE_BYTES
                    {
                        *last = snapshot;
                    } else {
                        last.push_str(&snapshot);
                    }
                    last.clone()
                };

                if let Err(e) = engine.store().persist_logs(job.id, &tail).await {
                    warn!(job_id = job.id, error = %e, "Failed to persist logs");
                }
            }
        }
    }
}
