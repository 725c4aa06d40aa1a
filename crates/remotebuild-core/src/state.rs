//! Job state machine.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// State of a build or upload job.
///
/// The numeric encoding is persisted in the store and is part of the wire
/// contract; clients filter historical jobs by these exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum JobState {
    Waiting = 0,
    Running = 1,
    Paused = 2,
    Cancelled = 3,
    Failed = 4,
    Done = 5,
}

impl JobState {
    /// Terminal states allow no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Failed | JobState::Done)
    }

    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

impl TryFrom<i16> for JobState {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self> {
        match value {
            0 => Ok(JobState::Waiting),
            1 => Ok(JobState::Running),
            2 => Ok(JobState::Paused),
            3 => Ok(JobState::Cancelled),
            4 => Ok(JobState::Failed),
            5 => Ok(JobState::Done),
            other => Err(Error::InvalidInput(format!("unknown job state {other}"))),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
            JobState::Done => "done",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_encoding_is_stable() {
        assert_eq!(JobState::Waiting.as_i16(), 0);
        assert_eq!(JobState::Running.as_i16(), 1);
        assert_eq!(JobState::Paused.as_i16(), 2);
        assert_eq!(JobState::Cancelled.as_i16(), 3);
        assert_eq!(JobState::Failed.as_i16(), 4);
        assert_eq!(JobState::Done.as_i16(), 5);
    }

    #[test]
    fn roundtrip_through_i16() {
        for raw in 0..=5 {
            let state = JobState::try_from(raw).unwrap();
            assert_eq!(state.as_i16(), raw);
        }
        assert!(JobState::try_from(6).is_err());
        assert!(JobState::try_from(-1).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Paused.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Done.is_terminal());
    }
}
