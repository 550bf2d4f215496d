use hoist_core::UserError;
use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;

use super::RegistryError;

pub(super) const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const NAMING_DOCS: &str = "https://cloud.google.com/artifact-registry/docs/docker/names#containers";

/// An Artifact Registry repository, parsed from
/// `<region>-docker.pkg.dev/<project>/<repository>[/<image>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpRepository {
    pub host: String,
    pub region: String,
    pub project: String,
    pub repository: String,
}

impl GcpRepository {
    pub fn parse(location: &str) -> Option<Self> {
        let mut parts = location.split('/').filter(|p| !p.is_empty());
        let host = parts.next()?;
        let region = host.strip_suffix("-docker.pkg.dev")?;
        let project = parts.next()?;
        let repository = parts.next()?;
        Some(Self {
            host: host.to_owned(),
            region: region.to_owned(),
            project: project.to_owned(),
            repository: repository.to_owned(),
        })
    }
}

/// Artifact Registry image names need host, project, repository and image.
pub fn validate_gcp_image_name(image: &str) -> Result<(), RegistryError> {
    let name = image.split_once(':').map_or(image, |(name, _)| name);
    let parts: Vec<&str> = name.split('/').collect();
    if parts.len() >= 4 && parts.iter().all(|p| !p.is_empty()) {
        return Ok(());
    }
    Err(RegistryError::InvalidImageName {
        provider: "gcp",
        source: UserError::new(format!(
            "Invalid image name {image:?}. Artifact Registry images must be named \
             LOCATION-docker.pkg.dev/PROJECT-ID/REPOSITORY/IMAGE. See {NAMING_DOCS}"
        )),
    })
}

#[derive(Deserialize)]
pub(super) struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

#[derive(Serialize)]
pub(super) struct JwtClaims<'a> {
    pub iss: &'a str,
    pub scope: &'a str,
    pub aud: &'a str,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
}

#[derive(Deserialize)]
pub(super) struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

#[derive(Deserialize)]
pub(super) struct OperationStatus {
    #[serde(default)]
    pub message: String,
}

pub(super) fn print_access_token() -> CommandSpec {
    CommandSpec::new("gcloud", ["auth", "print-access-token", "--quiet"])
}

pub(super) fn create_repository(repo: &GcpRepository) -> CommandSpec {
    CommandSpec::new(
        "gcloud",
        [
            "artifacts",
            "repositories",
            "create",
            repo.repository.as_str(),
            "--project",
            repo.project.as_str(),
            "--location",
            repo.region.as_str(),
            "--repository-format",
            "docker",
            "--async",
            "--format",
            "json",
        ],
    )
}

pub(super) fn describe_operation(repo: &GcpRepository, operation: &str) -> CommandSpec {
    CommandSpec::new(
        "gcloud",
        [
            "artifacts",
            "operations",
            "describe",
            operation,
            "--project",
            repo.project.as_str(),
            "--location",
            repo.region.as_str(),
            "--format",
            "json",
        ],
    )
}
