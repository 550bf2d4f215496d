use std::path::PathBuf;

use hoist_cloud::{CommandError, DockerError};
use hoist_core::UserError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("project directory {path} does not exist or is not a directory")]
    ProjectDir { path: PathBuf },

    #[error("no Dockerfile in {dir}")]
    DockerfileMissing { dir: PathBuf, source: UserError },

    #[error("invalid app name")]
    AppName { source: hoist_core::Error },

    #[error("invalid registry credentials: {reason}")]
    CacheCredentials { reason: String },

    #[error("build command for service {service} failed")]
    ServiceBuild {
        service: String,
        source: CommandError,
    },

    #[error("docker is not available")]
    DockerUnavailable { source: DockerError },

    #[error("failed to log in to cache registry {host}")]
    CacheLogin { host: String, source: DockerError },

    #[error("docker build failed")]
    Docker { source: DockerError },

    #[error("docker build failed after {attempts} attempts")]
    SessionRetriesExhausted { attempts: u32, source: DockerError },

    #[error("build cancelled")]
    Cancelled,
}
