//! One artifact upload.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remotebuild_core::args::ArgParser;
use remotebuild_core::resinfo::ResInfo;
use remotebuild_core::{Error, JobState, Result, UploadType};
use remotebuild_db::UploadJobRecord;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::Engine;

/// A job which uploads a built package to the storage collaborator.
pub struct UploadJob {
    pub id: i64,
    pub upload_type: UploadType,
    state: Mutex<JobState>,
    cancel: CancellationToken,
}

impl UploadJob {
    pub fn from_record(record: &UploadJobRecord) -> Self {
        Self {
            id: record.id,
            upload_type: record.upload_type,
            state: Mutex::new(record.state),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    /// Signal cancellation. Latched and non-blocking.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the upload, racing it against the cancel signal.
    ///
    /// The uploader receives the artifact paths, the credentials bundle and
    /// the cancel token so it can abort mid-stream.
    pub async fn run(&self, engine: &Engine, build: &ResInfo, parser: &ArgParser) -> Result<()> {
        debug!(upload_job_id = self.id, "Run upload job");
        self.set_state(JobState::Running);

        let target = match self.upload_type {
            UploadType::DataManager => match parser.data_manager_args() {
                Some(target) => target,
                None => {
                    self.set_state(JobState::Failed);
                    return Err(Error::NoUploadTargetData);
                }
            },
        };

        let upload = engine
            .uploader()
            .upload(&build.files, &target, &self.cancel);
        tokio::pin!(upload);

        tokio::select! {
            result = &mut upload => match result {
                Ok(()) => {
                    self.set_state(JobState::Done);
                    Ok(())
                }
                Err(Error::JobCancelled) => {
                    self.set_state(JobState::Cancelled);
                    Err(Error::JobCancelled)
                }
                Err(e) => {
                    self.set_state(JobState::Failed);
                    Err(e)
                }
            },
            _ = self.cancel.cancelled() => {
                self.set_state(JobState::Cancelled);
                Err(Error::JobCancelled)
            }
        }
    }

    /// Snapshot of the persistable fields.
    pub fn record(&self, created_at: DateTime<Utc>) -> UploadJobRecord {
        UploadJobRecord {
            id: self.id,
            created_at,
            state: self.state(),
            upload_type: self.upload_type,
        }
    }
}
