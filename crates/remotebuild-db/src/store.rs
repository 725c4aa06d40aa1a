//! The `JobStore` trait.

use async_trait::async_trait;

use crate::records::*;
use crate::DbResult;

/// Durable storage for jobs, their sub-jobs and the queue.
///
/// Writes are durable before the call returns. Deleting a queue item never
/// deletes its job row.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_build_job(&self, new: NewBuildJob) -> DbResult<BuildJobRecord>;

    async fn create_upload_job(&self, new: NewUploadJob) -> DbResult<UploadJobRecord>;

    async fn create_job(&self, new: NewJob) -> DbResult<JobRecord>;

    async fn save_job(&self, job: &JobRecord) -> DbResult<()>;

    async fn save_build_job(&self, job: &BuildJobRecord) -> DbResult<()>;

    async fn save_upload_job(&self, job: &UploadJobRecord) -> DbResult<()>;

    /// Update only the `last_logs` column of a job.
    async fn persist_logs(&self, job_id: i64, last_logs: &str) -> DbResult<()>;

    /// A job with both sub-jobs attached.
    async fn job(&self, job_id: i64) -> DbResult<HydratedJob>;

    /// Insert a queue item for `job_id`; the assigned id is returned so the
    /// caller can copy it into `position`.
    async fn create_queue_item(&self, job_id: i64) -> DbResult<QueueItemRecord>;

    async fn save_queue_item(&self, item: &QueueItemRecord) -> DbResult<()>;

    async fn delete_queue_item(&self, item_id: i64) -> DbResult<()>;

    /// All queue items whose job is in a non-terminal state (`Waiting` or
    /// `Running`), hydrated, ordered by position.
    async fn load_open_queue(&self) -> DbResult<Vec<HydratedQueueItem>>;

    /// Up to `limit` historical jobs, newest first. A job is historical when
    /// both sub-jobs left the trivial states: `state <> 0 AND state <> 3`
    /// on each. The predicate is part of the wire contract.
    async fn old_jobs(&self, limit: i64) -> DbResult<Vec<JobRecord>>;

    /// The persisted log tail of a job.
    async fn logs_of(&self, job_id: i64) -> DbResult<String>;
}
