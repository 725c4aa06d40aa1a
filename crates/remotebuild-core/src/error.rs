//! Error types for Remotebuild.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job cancelled")]
    JobCancelled,

    #[error("non zero exit code {0} from container")]
    NonZeroExit(i64),

    #[error("job not running")]
    JobNotRunning,

    #[error("no logs found")]
    NoLogsFound,

    #[error("no upload target data")]
    NoUploadTargetData,

    #[error("no valid upload method")]
    NoValidUploadMethod,

    #[error("no AUR repo-name found")]
    AurNoRepoFound,

    #[error("resInfo file is empty")]
    ResInfoFileEmpty,

    #[error("invalid resInfo format")]
    ResInfoInvalidFormat,

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is the expected outcome of a cooperative cancel,
    /// as opposed to a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::JobCancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
