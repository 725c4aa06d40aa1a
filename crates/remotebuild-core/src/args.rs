//! Per-job-type translation of the argument map into container env vars
//! and upload-target metadata.

use std::collections::HashMap;

use crate::{Error, JobType, Result};

/// Argument key carrying the AUR package name.
pub const AUR_PACKAGE: &str = "AURPackage";

/// Argument keys carrying DataManager upload-target data.
pub const DM_HOST: &str = "DMHost";
pub const DM_USER: &str = "DMUser";
pub const DM_TOKEN: &str = "DMToken";
pub const DM_NAMESPACE: &str = "DMNamespace";

/// Credentials bundle for a DataManager upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataManagerArgs {
    pub host: String,
    pub username: String,
    pub token: String,
    pub namespace: Option<String>,
}

/// Parses job arguments into container env vars and upload metadata.
#[derive(Debug, Clone)]
pub struct ArgParser {
    args: HashMap<String, String>,
    job_type: JobType,
}

impl ArgParser {
    pub fn new(args: HashMap<String, String>, job_type: JobType) -> Self {
        Self { args, job_type }
    }

    /// Derive the container env var list for the job type.
    pub fn parse_envs(&self) -> Result<Vec<String>> {
        match self.job_type {
            JobType::Aur => self.parse_aur_args(),
        }
    }

    fn parse_aur_args(&self) -> Result<Vec<String>> {
        let repo = self.args.get(AUR_PACKAGE).map(String::as_str).unwrap_or("");
        if repo.is_empty() {
            return Err(Error::AurNoRepoFound);
        }

        Ok(vec![format!("{AUR_PACKAGE}={repo}")])
    }

    /// True iff host, user and token of an upload target are all present.
    pub fn has_upload_target(&self) -> bool {
        [DM_HOST, DM_USER, DM_TOKEN]
            .iter()
            .all(|k| self.args.contains_key(*k))
    }

    /// Upload-target credentials, if complete.
    pub fn data_manager_args(&self) -> Option<DataManagerArgs> {
        if !self.has_upload_target() {
            return None;
        }

        Some(DataManagerArgs {
            host: self.args[DM_HOST].clone(),
            username: self.args[DM_USER].clone(),
            token: self.args[DM_TOKEN].clone(),
            namespace: self.args.get(DM_NAMESPACE).cloned(),
        })
    }

    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }
}

/// Every map entry as `KEY=VALUE`, used for job types without a dedicated
/// argument schema.
pub fn args_to_envs(args: &HashMap<String, String>) -> Vec<String> {
    args.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// Serialize the argument map for persistence.
pub fn serialize_args(args: &HashMap<String, String>) -> Result<String> {
    serde_json::to_string(args).map_err(|e| Error::Internal(e.to_string()))
}

/// Parse a persisted argument map. An empty string (cleared after terminal
/// cleanup) yields an empty map.
pub fn parse_args(raw: &str) -> Result<HashMap<String, String>> {
    if raw.is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw).map_err(|e| Error::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn aur_args_produce_single_env() {
        let parser = ArgParser::new(args_of(&[(AUR_PACKAGE, "vim")]), JobType::Aur);
        assert_eq!(parser.parse_envs().unwrap(), vec!["AURPackage=vim"]);
    }

    #[test]
    fn aur_args_without_package_fail() {
        let parser = ArgParser::new(HashMap::new(), JobType::Aur);
        assert!(matches!(parser.parse_envs(), Err(Error::AurNoRepoFound)));

        let parser = ArgParser::new(args_of(&[(AUR_PACKAGE, "")]), JobType::Aur);
        assert!(matches!(parser.parse_envs(), Err(Error::AurNoRepoFound)));
    }

    #[test]
    fn extra_args_are_ignored_for_aur() {
        let parser = ArgParser::new(
            args_of(&[(AUR_PACKAGE, "vim"), ("UNRELATED", "1")]),
            JobType::Aur,
        );
        assert_eq!(parser.parse_envs().unwrap(), vec!["AURPackage=vim"]);
    }

    #[test]
    fn upload_target_requires_host_user_and_token() {
        let full = args_of(&[
            (DM_HOST, "https://dm.example.com"),
            (DM_USER, "builder"),
            (DM_TOKEN, "secret"),
        ]);
        assert!(ArgParser::new(full.clone(), JobType::Aur).has_upload_target());

        for missing in [DM_HOST, DM_USER, DM_TOKEN] {
            let mut partial = full.clone();
            partial.remove(missing);
            assert!(
                !ArgParser::new(partial, JobType::Aur).has_upload_target(),
                "missing {missing} should invalidate the target"
            );
        }
    }

    #[test]
    fn data_manager_args_carry_optional_namespace() {
        let parser = ArgParser::new(
            args_of(&[
                (DM_HOST, "https://dm.example.com"),
                (DM_USER, "builder"),
                (DM_TOKEN, "secret"),
                (DM_NAMESPACE, "packages"),
            ]),
            JobType::Aur,
        );

        let dm = parser.data_manager_args().unwrap();
        assert_eq!(dm.host, "https://dm.example.com");
        assert_eq!(dm.username, "builder");
        assert_eq!(dm.token, "secret");
        assert_eq!(dm.namespace.as_deref(), Some("packages"));
    }

    #[test]
    fn generic_env_derivation_emits_every_entry() {
        let envs = args_to_envs(&args_of(&[("A", "1"), ("B", "2")]));
        assert_eq!(envs.len(), 2);
        assert!(envs.contains(&"A=1".to_string()));
        assert!(envs.contains(&"B=2".to_string()));
    }

    #[test]
    fn args_serialization_roundtrip() {
        let args = args_of(&[(AUR_PACKAGE, "vim"), (DM_HOST, "h"), ("Ünïcode", "wörks")]);
        let raw = serialize_args(&args).unwrap();
        assert_eq!(parse_args(&raw).unwrap(), args);
    }

    #[test]
    fn empty_serialized_args_parse_to_empty_map() {
        assert!(parse_args("").unwrap().is_empty());
    }
}
