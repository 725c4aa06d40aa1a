//! Persisted record types.

use chrono::{DateTime, Utc};
use remotebuild_core::{JobState, JobType, UploadType};
use serde::{Deserialize, Serialize};

/// A job row. Retained after the queue item is deleted, for log history
/// and listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub build_job_id: i64,
    pub upload_job_id: i64,
    /// Scratch directory holding the build files.
    pub data_dir: String,
    /// Serialized argument map; cleared at terminal cleanup.
    pub args: String,
    /// Last persisted log tail.
    pub last_logs: String,
    /// Result summary ("Success", "Cancelled", ...).
    pub result: String,
}

/// One container execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJobRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    pub job_type: JobType,
    pub image: String,
    pub use_ccache: bool,
}

/// One artifact upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJobRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    pub upload_type: UploadType,
}

/// Durable queue membership. `position` equals the row id at insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItemRecord {
    pub id: i64,
    pub job_id: i64,
    pub position: i64,
}

/// A job row together with its sub-jobs.
#[derive(Debug, Clone)]
pub struct HydratedJob {
    pub job: JobRecord,
    pub build: BuildJobRecord,
    pub upload: UploadJobRecord,
}

/// A queue item together with its hydrated job.
#[derive(Debug, Clone)]
pub struct HydratedQueueItem {
    pub item: QueueItemRecord,
    pub job: HydratedJob,
}

/// Fields for inserting a new build job.
#[derive(Debug, Clone)]
pub struct NewBuildJob {
    pub job_type: JobType,
    pub image: String,
    pub use_ccache: bool,
}

/// Fields for inserting a new upload job.
#[derive(Debug, Clone)]
pub struct NewUploadJob {
    pub upload_type: UploadType,
}

/// Fields for inserting a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub build_job_id: i64,
    pub upload_job_id: i64,
    pub data_dir: String,
    pub args: String,
}
