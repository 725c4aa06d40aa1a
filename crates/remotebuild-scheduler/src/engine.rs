//! Shared engine handles.
//!
//! Jobs and sub-jobs are plain data; every behavior takes `&Engine` to reach
//! the store, the container runtime and the uploader. This keeps the data
//! model free of cyclic references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use remotebuild_core::runtime::ContainerRuntime;
use remotebuild_core::JobType;
use remotebuild_db::JobStore;

use crate::uploader::ArtifactUploader;

/// Engine settings derived from the server configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Image reference per canonical job-type string ("buildAUR", ...).
    pub images: HashMap<String, String>,
    /// Host ccache directory mounted into builds that request it.
    pub ccache_dir: Option<PathBuf>,
    /// Keep build containers around after exit instead of auto-removing.
    pub keep_build_container: bool,
}

/// Shared handles of the job engine.
pub struct Engine {
    store: Arc<dyn JobStore>,
    runtime: Arc<dyn ContainerRuntime>,
    uploader: Arc<dyn ArtifactUploader>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn JobStore>,
        runtime: Arc<dyn ContainerRuntime>,
        uploader: Arc<dyn ArtifactUploader>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            uploader,
            config,
        }
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn uploader(&self) -> &dyn ArtifactUploader {
        self.uploader.as_ref()
    }

    /// Image configured for a build type.
    pub fn image_for(&self, job_type: JobType) -> Option<&str> {
        self.config
            .images
            .get(job_type.as_str())
            .map(String::as_str)
    }

    pub fn ccache_dir(&self) -> Option<&Path> {
        self.config.ccache_dir.as_deref()
    }

    pub fn keep_build_container(&self) -> bool {
        self.config.keep_build_container
    }
}
