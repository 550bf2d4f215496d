//! Image registry classification, credentials and repository provisioning.

mod aws;
mod client;
mod docker_config;
mod gcp;

use std::fmt;
use std::sync::LazyLock;

use hoist_core::UserError;
use regex::Regex;
use secrecy::SecretString;

use crate::command::CommandError;

pub use aws::{EcrHost, LIFECYCLE_POLICY};
pub use client::{GcpKeySource, RegistryClient};
pub use docker_config::{CredentialSource, DockerConfig};
pub use gcp::{GcpRepository, validate_gcp_image_name};

/// Default Docker Hub host used for `docker login` and credential lookup.
pub const DOCKER_HUB_HOST: &str = "docker.io";

static ECR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.dkr\.ecr(-fips)?\.([a-z0-9-]+)\.amazonaws\.com(\.cn)?(/.*)?$")
        .expect("valid regex")
});
static GCP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9-]+-docker\.pkg\.dev|([a-z]+\.)?gcr\.io)(/.*)?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    /// Registry provisioned for the project, with injected credentials
    ProjectManaged,
    Aws,
    Gcp,
    DockerHub,
    Unknown,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProjectManaged => "project-managed",
            Self::Aws => "aws-ecr",
            Self::Gcp => "gcp-artifact-registry",
            Self::DockerHub => "docker-hub",
            Self::Unknown => "generic",
        })
    }
}

/// Classify a registry location such as `123456789012.dkr.ecr.us-east-1.amazonaws.com/app`.
pub fn classify(location: &str) -> RegistryKind {
    let location = location.trim();
    if location.is_empty() || location.contains("docker.io") || location.contains("hub.docker")
    {
        return RegistryKind::DockerHub;
    }
    if ECR_PATTERN.is_match(location) {
        return RegistryKind::Aws;
    }
    if GCP_PATTERN.is_match(location) {
        return RegistryKind::Gcp;
    }
    if !first_segment_is_host(location) {
        // `user/repo` or bare `repo`
        return RegistryKind::DockerHub;
    }
    RegistryKind::Unknown
}

fn first_segment_is_host(location: &str) -> bool {
    match location.split_once('/') {
        Some((first, _)) => first.contains('.') || first.contains(':') || first == "localhost",
        None => false,
    }
}

/// Registry host part of `location`, `docker.io` for Docker Hub references.
pub fn registry_host(location: &str) -> &str {
    match location.split_once('/') {
        Some((first, _)) if first_segment_is_host(location) => first,
        _ if location.contains('.') && !location.contains('/') => location,
        _ => DOCKER_HUB_HOST,
    }
}

#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: SecretString,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A resolved registry: where to push and how to log in.
#[derive(Debug, Clone)]
pub struct ImageRegistry {
    pub kind: RegistryKind,
    /// Repository images are pushed to, without tag
    pub repository: String,
    pub host: String,
    pub credentials: Option<RegistryCredentials>,
}

impl ImageRegistry {
    pub fn remote_image(&self, tag: &str) -> String {
        format!("{}:{tag}", self.repository)
    }

    /// Repository path below the host, e.g. `team/app`.
    pub fn repository_path(&self) -> &str {
        self.repository
            .strip_prefix(&self.host)
            .map(|rest| rest.trim_start_matches('/'))
            // arch-lint: allow(no-silent-result-drop) reason="a repository not below the host is already a bare path"
            .unwrap_or(&self.repository)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to get {provider} registry credentials")]
    Credentials {
        provider: &'static str,
        source: UserError,
    },

    #[error("failed to create repository {repository}")]
    CreateRepository {
        repository: String,
        source: CommandError,
    },

    #[error("failed to set lifecycle policy on {repository}")]
    LifecyclePolicy {
        repository: String,
        source: CommandError,
    },

    #[error("repository operation {operation} did not finish")]
    OperationTimeout { operation: String },

    #[error("repository operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("failed to parse {what}")]
    Parse {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to read docker config at {path}")]
    DockerConfig {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("invalid image name for {provider}")]
    InvalidImageName {
        provider: &'static str,
        source: UserError,
    },
}

/// Credential exchange and repository provisioning against registry providers.
#[allow(async_fn_in_trait)]
pub trait RegistryApi: Send + Sync {
    /// Short-lived ECR token for `host`.
    async fn ecr_credentials(&self, host: &EcrHost) -> Result<RegistryCredentials, RegistryError>;

    /// OAuth2 access token usable as a GCP registry password.
    async fn gcp_credentials(&self) -> Result<RegistryCredentials, RegistryError>;

    /// Credentials stored by `docker login`, if any.
    async fn local_credentials(
        &self,
        host: &str,
    ) -> Result<Option<RegistryCredentials>, RegistryError>;

    /// Create the ECR repository if needed and attach the lifecycle policy.
    async fn ensure_ecr_repository(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<(), RegistryError>;

    /// Create the Artifact Registry repository if needed, waiting for it.
    async fn ensure_gcp_repository(&self, repository: &GcpRepository) -> Result<(), RegistryError>;
}

/// Classify `location` and resolve its credentials. Explicit project-managed
/// credentials win over pattern matching.
pub async fn resolve<R: RegistryApi>(
    api: &R,
    location: &str,
    project_credentials: Option<RegistryCredentials>,
) -> Result<ImageRegistry, RegistryError> {
    let host = registry_host(location).to_owned();
    let repository = location.trim().trim_end_matches('/').to_owned();

    if let Some(credentials) = project_credentials {
        return Ok(ImageRegistry {
            kind: RegistryKind::ProjectManaged,
            repository,
            host,
            credentials: Some(credentials),
        });
    }

    let kind = classify(location);
    tracing::debug!(%kind, location, "classified registry");
    let credentials = match kind {
        RegistryKind::Aws => match EcrHost::parse(&host) {
            Some(ecr) => Some(api.ecr_credentials(&ecr).await?),
            None => None,
        },
        RegistryKind::Gcp => Some(api.gcp_credentials().await?),
        RegistryKind::DockerHub | RegistryKind::Unknown => api.local_credentials(&host).await?,
        RegistryKind::ProjectManaged => None,
    };

    Ok(ImageRegistry {
        kind,
        repository,
        host,
        credentials,
    })
}

/// Make sure the target repository exists. Docker Hub and generic
/// registries create repositories on first push.
pub async fn ensure_repository<R: RegistryApi>(
    api: &R,
    registry: &ImageRegistry,
) -> Result<(), RegistryError> {
    match registry.kind {
        RegistryKind::Aws | RegistryKind::ProjectManaged => {
            match EcrHost::parse(&registry.host) {
                Some(ecr) => api.ensure_ecr_repository(&ecr, registry.repository_path()).await,
                None => Ok(()),
            }
        }
        RegistryKind::Gcp => match GcpRepository::parse(&registry.repository) {
            Some(repo) => api.ensure_gcp_repository(&repo).await,
            None => Ok(()),
        },
        RegistryKind::DockerHub | RegistryKind::Unknown => Ok(()),
    }
}
