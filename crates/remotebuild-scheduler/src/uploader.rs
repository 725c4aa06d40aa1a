//! Artifact upload to the remote file-storage service.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use remotebuild_core::args::DataManagerArgs;
use remotebuild_core::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Uploads build artifacts to a storage target.
///
/// Implementations observe `cancel` at I/O boundaries and abort their
/// stream with `Error::JobCancelled`.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(
        &self,
        files: &[PathBuf],
        target: &DataManagerArgs,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// HTTP client for a DataManager file-storage instance.
pub struct DataManagerClient {
    http: reqwest::Client,
}

impl DataManagerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn upload_file(&self, file: &Path, target: &DataManagerArgs) -> Result<()> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::UploadFailed(format!("invalid artifact path {file:?}")))?;

        let contents = tokio::fs::read(file).await?;
        let part = reqwest::multipart::Part::bytes(contents).file_name(name.clone());
        let mut form = reqwest::multipart::Form::new()
            .text("name", name.clone())
            .part("file", part);
        if let Some(namespace) = &target.namespace {
            form = form.text("namespace", namespace.clone());
        }

        let url = format!("{}/upload/file", target.host.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&target.token)
            .header("X-Username", &target.username)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::UploadFailed(format!(
                "{name}: server returned {}",
                response.status()
            )));
        }

        debug!(artifact = %name, "Artifact uploaded");
        Ok(())
    }
}

impl Default for DataManagerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactUploader for DataManagerClient {
    async fn upload(
        &self,
        files: &[PathBuf],
        target: &DataManagerArgs,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for file in files {
            tokio::select! {
                result = self.upload_file(file, target) => result?,
                _ = cancel.cancelled() => return Err(Error::JobCancelled),
            }
        }

        info!(count = files.len(), host = %target.host, "Upload complete");
        Ok(())
    }
}
