//! Lifecycle owner of the job queue.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remotebuild_core::args::serialize_args;
use remotebuild_core::{Error, JobState, JobType, Result, UploadType};
use remotebuild_db::{JobRecord, NewBuildJob, NewJob, NewUploadJob};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::engine::Engine;
use crate::job::Job;
use crate::queue::{JobQueue, QueueItem};

/// Length of the random suffix of a scratch directory name.
const SCRATCH_SUFFIX_LEN: usize = 30;

/// Client-facing description of a job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job_id: i64,
    pub job_type: JobType,
    pub upload_type: UploadType,
    pub state: JobState,
    /// Index in the queue, for jobs still queued.
    pub position: Option<usize>,
    pub running_since: Option<DateTime<Utc>>,
    pub result: String,
}

/// Managing jobs: owns the queue, runs the worker, answers queries.
pub struct JobService {
    engine: Arc<Engine>,
    queue: Arc<JobQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobService {
    /// Create the service, loading the queue from the store.
    pub async fn new(engine: Arc<Engine>) -> Result<Self> {
        let queue = Arc::new(JobQueue::load(Arc::clone(&engine)).await?);
        Ok(Self {
            engine,
            queue,
            worker: Mutex::new(None),
        })
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Self-check, then start the queue worker. Fails when a supported
    /// build type has no image mapping.
    pub fn start(&self) -> Result<()> {
        self.check()?;

        info!("Starting job service");
        let queue = Arc::clone(&self.queue);
        *self.worker.lock() = Some(tokio::spawn(async move { queue.run().await }));
        Ok(())
    }

    fn check(&self) -> Result<()> {
        for job_type in JobType::ALL {
            if self.engine.image_for(*job_type).is_none() {
                error!("No image specified for {job_type} building!");
                return Err(Error::Internal(format!(
                    "no image specified for {job_type} building"
                )));
            }
        }
        Ok(())
    }

    /// Cancel the in-flight job and stop the worker.
    pub async fn stop(&self) {
        self.queue.stop().await;

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Create a job with its sub-jobs and scratch directory, persist
    /// everything and append it to the queue.
    pub async fn add_job(
        &self,
        job_type: JobType,
        upload_type: UploadType,
        args: HashMap<String, String>,
        enable_ccache: bool,
    ) -> Result<Arc<QueueItem>> {
        let image = self
            .engine
            .image_for(job_type)
            .ok_or_else(|| Error::ImageNotFound(job_type.to_string()))?
            .to_string();

        let scratch_dir = create_scratch_dir()?;

        let build = self
            .engine
            .store()
            .create_build_job(NewBuildJob {
                job_type,
                image,
                use_ccache: enable_ccache,
            })
            .await?;

        let upload = self
            .engine
            .store()
            .create_upload_job(NewUploadJob { upload_type })
            .await?;

        let record = self
            .engine
            .store()
            .create_job(NewJob {
                build_job_id: build.id,
                upload_job_id: upload.id,
                data_dir: scratch_dir.to_string_lossy().into_owned(),
                args: serialize_args(&args)?,
            })
            .await?;

        let job = Arc::new(Job::from_hydrated(&remotebuild_db::HydratedJob {
            job: record,
            build,
            upload,
        })?);

        self.queue.add_job(job).await
    }

    /// Describe a job, preferring the live queue over the store.
    pub async fn job_info(&self, job_id: i64) -> Result<JobInfo> {
        if let Some(item) = self.queue.find_job(job_id) {
            return Ok(JobInfo {
                job_id: item.job.id,
                job_type: item.job.build.job_type,
                upload_type: item.job.upload.upload_type,
                state: item.job.state(),
                position: self.queue.queue_position(&item),
                running_since: item.running_since(),
                result: item.job.result(),
            });
        }

        let hydrated = self.engine.store().job(job_id).await?;
        let state = if hydrated.build.state != JobState::Done {
            hydrated.build.state
        } else {
            hydrated.upload.state
        };

        Ok(JobInfo {
            job_id: hydrated.job.id,
            job_type: hydrated.build.job_type,
            upload_type: hydrated.upload.upload_type,
            state,
            position: None,
            running_since: None,
            result: hydrated.job.result,
        })
    }

    /// Cancel a queued or running job and drop it from the queue.
    pub async fn cancel_job(&self, job_id: i64) -> Result<()> {
        let item = self
            .queue
            .find_job(job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;

        item.job.cancel(&self.engine).await;
        self.queue.remove_job(job_id);

        // The row must not resurrect the job on restart.
        if let Err(e) = self.engine.store().delete_queue_item(item.id).await {
            tracing::warn!(item_id = item.id, error = %e, "Failed to delete queue item");
        }
        Ok(())
    }

    /// Pause or resume a job's build container.
    pub async fn pause_job(&self, job_id: i64) -> Result<()> {
        let item = self
            .queue
            .find_job(job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        item.job.build.pause(&self.engine).await
    }

    pub async fn resume_job(&self, job_id: i64) -> Result<()> {
        let item = self
            .queue
            .find_job(job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        item.job.build.resume(&self.engine).await
    }

    /// Write a queued job's live logs to `out`.
    pub async fn job_logs(
        &self,
        job_id: i64,
        now: DateTime<Utc>,
        since: i64,
        out: remotebuild_core::runtime::LogWriter<'_>,
        anti_replay: bool,
    ) -> Result<()> {
        let item = self
            .queue
            .find_job(job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        item.job.get_logs(&self.engine, now, since, out, anti_replay).await
    }

    /// Historical jobs, newest first.
    pub async fn old_jobs(&self, limit: i64) -> Result<Vec<JobRecord>> {
        Ok(self.engine.store().old_jobs(limit).await?)
    }

    /// Persisted log tail of a historical job.
    pub async fn old_logs(&self, job_id: i64) -> Result<String> {
        Ok(self.engine.store().logs_of(job_id).await?)
    }
}

/// Create `<OS temp>/remotebuild_<30-char random>` with mode 0700.
fn create_scratch_dir() -> Result<PathBuf> {
    let mut suffix = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    suffix.truncate(SCRATCH_SUFFIX_LEN);

    let path = std::env::temp_dir().join(format!("remotebuild_{suffix}"));
    std::fs::create_dir_all(&path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_dirs_are_unique_and_private() {
        let a = create_scratch_dir().unwrap();
        let b = create_scratch_dir().unwrap();

        assert_ne!(a, b);
        for dir in [&a, &b] {
            let name = dir.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("remotebuild_"));
            assert_eq!(name.len(), "remotebuild_".len() + SCRATCH_SUFFIX_LEN);

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = std::fs::metadata(dir).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o700);
            }

            std::fs::remove_dir_all(dir).unwrap();
        }
    }
}
