use std::path::PathBuf;

use hoist_cloud::{ClusterError, DockerError, HelmError, RegistryError};
use hoist_core::UserError;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to resolve image registry {location}")]
    Registry {
        location: String,
        source: RegistryError,
    },

    #[error("failed to prepare repository {repository}")]
    Repository {
        repository: String,
        source: RegistryError,
    },

    #[error("invalid remote image name {image}")]
    InvalidImageName {
        image: String,
        source: RegistryError,
    },

    #[error("failed to log in to {host}")]
    Login { host: String, source: DockerError },

    #[error("failed to tag {image}")]
    Tag { image: String, source: DockerError },

    #[error("failed to push {image}")]
    Push { image: String, source: UserError },

    #[error("publish cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to load chart values")]
    Values { source: hoist_core::Error },

    #[error("failed to read env file {path}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("secret files {first} and {second} have the same file name")]
    DuplicateSecretFile { first: PathBuf, second: PathBuf },

    #[error("failed to load secret file {path}")]
    SecretFile { path: PathBuf, source: UserError },

    #[error("chart {chart} is missing {field}")]
    InvalidChart { chart: String, field: &'static str },

    #[error("failed to list releases in namespace {namespace}")]
    ListReleases {
        namespace: String,
        source: UserError,
    },

    #[error("failed to read runtime secret")]
    RuntimeSecret { source: ClusterError },

    #[error("failed to {action} {release}")]
    Chart {
        action: &'static str,
        release: String,
        source: HelmError,
    },

    #[error("failed to upgrade {release}")]
    Upgrade { release: String, source: UserError },

    #[error("failed to reinstall {release}")]
    Reinstall { release: String, source: UserError },

    #[error("failed to watch pods")]
    Watch { source: ClusterError },

    #[error("container {container} in pod {pod} is failing: {reason}")]
    CrashDetected {
        pod: String,
        container: String,
        reason: String,
        source: UserError,
    },

    #[error("deploy cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum DownError {
    #[error("failed to list releases in namespace {namespace}")]
    ListReleases {
        namespace: String,
        source: UserError,
    },

    #[error("app {instance} is not installed")]
    AppNotFound { instance: String, source: UserError },

    #[error("failed to uninstall {release}")]
    Uninstall { release: String, source: HelmError },

    #[error("failed to delete resources created by {instance}")]
    Cleanup {
        instance: String,
        source: ClusterError,
    },
}

/// Failure of one stage of `hoist up`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("build failed")]
    Build {
        #[from]
        source: hoist_build::BuildError,
    },

    #[error("publish failed")]
    Publish {
        #[from]
        source: PublishError,
    },

    #[error("deploy failed")]
    Deploy {
        #[from]
        source: DeployError,
    },
}

pub(crate) fn list_releases_error(err: HelmError) -> UserError {
    UserError::with_cause(
        "Unable to access helm releases. You may not have permission to access the cluster \
         or namespace. Please refresh your credentials and try again.",
        err,
    )
}
