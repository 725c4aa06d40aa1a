//! Container driver backends for Remotebuild.

pub mod docker;

pub use docker::DockerDriver;
