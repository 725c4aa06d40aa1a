//! Job and upload type enumerations.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kind of package build a job performs.
///
/// The canonical string is the key into the configured image map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Build a source package from the Arch User Repository.
    Aur,
}

impl JobType {
    /// All build types the server supports.
    pub const ALL: &'static [JobType] = &[JobType::Aur];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Aur => "buildAUR",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buildAUR" => Ok(JobType::Aur),
            other => Err(Error::InvalidInput(format!("unknown job type {other:?}"))),
        }
    }
}

/// Destination kind for built artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadType {
    /// Upload to a DataManager file-storage instance.
    DataManager,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::DataManager => "DataManager",
        }
    }
}

impl std::fmt::Display for UploadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DataManager" => Ok(UploadType::DataManager),
            other => Err(Error::InvalidInput(format!("unknown upload type {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_roundtrip() {
        for ty in JobType::ALL {
            assert_eq!(ty.as_str().parse::<JobType>().unwrap(), *ty);
        }
        assert!("buildRPM".parse::<JobType>().is_err());
    }

    #[test]
    fn upload_type_roundtrip() {
        assert_eq!(
            "DataManager".parse::<UploadType>().unwrap(),
            UploadType::DataManager
        );
        assert!("ftp".parse::<UploadType>().is_err());
    }
}
