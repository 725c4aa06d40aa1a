//! The Remotebuild job engine.
//!
//! A persistent, single-worker job queue that drives each build through a
//! two-phase (build, then upload) pipeline, manages the build container's
//! lifecycle, streams live logs, supports pause/resume/cancel on an
//! in-flight job, and reconciles its in-memory queue against the durable
//! store after a restart.

pub mod build_job;
pub mod engine;
pub mod job;
pub mod queue;
pub mod service;
pub mod upload_job;
pub mod uploader;

pub use build_job::BuildJob;
pub use engine::{Engine, EngineConfig};
pub use job::Job;
pub use queue::{JobQueue, QueueItem};
pub use service::{JobInfo, JobService};
pub use upload_job::UploadJob;
pub use uploader::{ArtifactUploader, DataManagerClient};
