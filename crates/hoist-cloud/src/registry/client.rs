use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hoist_core::UserError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};

use crate::command::CommandSpec;
use crate::executor::{CommandExecutor, RealExecutor};

use super::docker_config::{self, CredentialSource, DockerConfig, HelperOutput};
use super::gcp::{self, GcpRepository, JwtClaims, Operation, ServiceAccountKey, TokenResponse};
use super::{EcrHost, RegistryApi, RegistryCredentials, RegistryError, aws};

const GCP_USERNAME: &str = "oauth2accesstoken";
const ECR_USERNAME: &str = "AWS";
const GCP_CREDENTIALS_MISSING: &str =
    "Could not find GCP credentials. Did you forget to run `gcloud auth login`?";

/// Where a GCP service-account key comes from.
#[derive(Clone)]
pub enum GcpKeySource {
    /// Base64-encoded key JSON, e.g. from `HOIST_GCP_CREDENTIALS`
    Encoded(SecretString),
    /// Path to a key file, e.g. from `GOOGLE_APPLICATION_CREDENTIALS`
    File(PathBuf),
}

impl GcpKeySource {
    pub fn from_env() -> Option<Self> {
        if let Ok(encoded) = std::env::var("HOIST_GCP_CREDENTIALS") {
            return Some(Self::Encoded(SecretString::from(encoded)));
        }
        std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(|p| Self::File(PathBuf::from(p)))
    }
}

/// [`RegistryApi`] backed by the `aws`, `gcloud` and `docker-credential-*`
/// CLIs plus the Google OAuth2 token endpoint.
pub struct RegistryClient<E: CommandExecutor = RealExecutor> {
    executor: E,
    http: reqwest::Client,
    docker_config_dir: Option<PathBuf>,
    gcp_key: Option<GcpKeySource>,
    poll_interval: Duration,
    max_polls: u32,
}

impl RegistryClient<RealExecutor> {
    /// Client configured from the environment.
    pub fn new() -> Self {
        Self::with_executor(RealExecutor)
            .docker_config_dir(DockerConfig::default_dir())
            .gcp_key(GcpKeySource::from_env())
    }
}

impl Default for RegistryClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> RegistryClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            http: reqwest::Client::new(),
            docker_config_dir: None,
            gcp_key: None,
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }

    pub fn docker_config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.docker_config_dir = dir;
        self
    }

    pub fn gcp_key(mut self, key: Option<GcpKeySource>) -> Self {
        self.gcp_key = key;
        self
    }

    pub fn poll_interval(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    // ── GCP ──

    fn load_service_account(&self, source: &GcpKeySource) -> Result<ServiceAccountKey, String> {
        let raw = match source {
            GcpKeySource::Encoded(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.expose_secret().trim())
                    .map_err(|e| format!("invalid base64 service account key: {e}"))?;
                String::from_utf8(bytes).map_err(|e| e.to_string())?
            }
            GcpKeySource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?,
        };
        serde_json::from_str(&raw).map_err(|e| format!("invalid service account key: {e}"))
    }

    async fn exchange_service_account(&self, key: &ServiceAccountKey) -> Result<String, String> {
        let iat = jsonwebtoken::get_current_timestamp();
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: gcp::TOKEN_SCOPE,
            aud: &key.token_uri,
            iat,
            exp: iat + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let signing_key =
            EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| e.to_string())?;
        let assertion =
            jsonwebtoken::encode(&header, &claims, &signing_key).map_err(|e| e.to_string())?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        let token: TokenResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(token.access_token)
    }

    async fn service_account_token(&self) -> Option<Result<String, String>> {
        let source = self.gcp_key.as_ref()?;
        Some(match self.load_service_account(source) {
            Ok(key) => self.exchange_service_account(&key).await,
            Err(e) => Err(e),
        })
    }

    async fn wait_for_operation(
        &self,
        repo: &GcpRepository,
        operation: &str,
    ) -> Result<(), RegistryError> {
        for _ in 0..self.max_polls {
            let out = self
                .executor
                .exec(&gcp::describe_operation(repo, operation))
                .await
                .map_err(|e| RegistryError::CreateRepository {
                    repository: repo.repository.clone(),
                    source: e,
                })?;
            let op: Operation = serde_json::from_str(&out).map_err(|e| RegistryError::Parse {
                what: "artifact registry operation",
                source: e,
            })?;
            if op.done {
                return finished(op);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(RegistryError::OperationTimeout {
            operation: operation.to_owned(),
        })
    }

    // ── Docker credential store ──

    async fn run_helper(
        &self,
        helper: &str,
        host: &str,
    ) -> Result<Option<RegistryCredentials>, RegistryError> {
        let cmd = CommandSpec::new(&format!("docker-credential-{helper}"), ["get"]).stdin(host);
        match self.executor.exec(&cmd).await {
            Ok(out) => {
                let parsed: HelperOutput =
                    serde_json::from_str(&out).map_err(|e| RegistryError::Parse {
                        what: "credential helper output",
                        source: e,
                    })?;
                Ok(Some(RegistryCredentials::new(parsed.username, parsed.secret)))
            }
            Err(e) => {
                tracing::debug!(helper, host, error = %e, "credential helper has no entry");
                Ok(None)
            }
        }
    }
}

fn finished(op: Operation) -> Result<(), RegistryError> {
    match op.error {
        Some(status) if !is_already_exists(&status.message) => Err(RegistryError::OperationFailed {
            operation: op.name,
            message: status.message,
        }),
        _ => Ok(()),
    }
}

fn is_already_exists(message: &str) -> bool {
    message.contains("ALREADY_EXISTS") || message.to_lowercase().contains("already exists")
}

impl<E: CommandExecutor> RegistryApi for RegistryClient<E> {
    async fn ecr_credentials(&self, host: &EcrHost) -> Result<RegistryCredentials, RegistryError> {
        let password = self
            .executor
            .exec(&aws::login_password(host))
            .await
            .map_err(|e| RegistryError::Credentials {
                provider: "aws",
                source: UserError::with_cause(
                    "Could not get an ECR login token. Check your AWS credentials \
                     (aws configure) and that the region is correct.",
                    e,
                ),
            })?;
        Ok(RegistryCredentials::new(ECR_USERNAME, password.trim()))
    }

    async fn gcp_credentials(&self) -> Result<RegistryCredentials, RegistryError> {
        let service_account_error = match self.service_account_token().await {
            Some(Ok(token)) => return Ok(RegistryCredentials::new(GCP_USERNAME, token)),
            Some(Err(e)) => Some(e),
            None => None,
        };
        if let Some(e) = &service_account_error {
            tracing::debug!(error = %e, "service account token exchange failed, trying gcloud");
        }

        match self.executor.exec(&gcp::print_access_token()).await {
            Ok(token) if !token.trim().is_empty() => {
                Ok(RegistryCredentials::new(GCP_USERNAME, token.trim()))
            }
            Ok(_) => Err(RegistryError::Credentials {
                provider: "gcp",
                source: UserError::new(GCP_CREDENTIALS_MISSING),
            }),
            Err(e) => Err(RegistryError::Credentials {
                provider: "gcp",
                source: UserError::with_cause(GCP_CREDENTIALS_MISSING, e),
            }),
        }
    }

    async fn local_credentials(
        &self,
        host: &str,
    ) -> Result<Option<RegistryCredentials>, RegistryError> {
        let Some(dir) = &self.docker_config_dir else {
            return Ok(None);
        };
        let config = DockerConfig::load(dir)?;
        match config.source_for(host) {
            Some(CredentialSource::Inline(auth)) => Ok(docker_config::decode_inline(&auth)),
            Some(CredentialSource::Helper(helper)) => {
                for key in docker_config::lookup_keys(host) {
                    if let Some(creds) = self.run_helper(&helper, &key).await? {
                        return Ok(Some(creds));
                    }
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn ensure_ecr_repository(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<(), RegistryError> {
        match self
            .executor
            .exec(&aws::create_repository(host, repository))
            .await
        {
            Ok(_) => tracing::debug!(repository, "created ECR repository"),
            Err(e) if e.stderr_contains("RepositoryAlreadyExistsException") => {
                tracing::debug!(repository, "ECR repository already exists");
            }
            Err(e) => {
                return Err(RegistryError::CreateRepository {
                    repository: repository.to_owned(),
                    source: e,
                });
            }
        }

        self.executor
            .exec(&aws::put_lifecycle_policy(host, repository))
            .await
            .map(|_| ())
            .map_err(|e| RegistryError::LifecyclePolicy {
                repository: repository.to_owned(),
                source: e,
            })
    }

    async fn ensure_gcp_repository(&self, repo: &GcpRepository) -> Result<(), RegistryError> {
        let out = match self.executor.exec(&gcp::create_repository(repo)).await {
            Ok(out) => out,
            Err(e) if e.stderr_contains("ALREADY_EXISTS") || e.stderr_contains("already exists") => {
                tracing::debug!(repository = %repo.repository, "artifact repository already exists");
                return Ok(());
            }
            Err(e) => {
                return Err(RegistryError::CreateRepository {
                    repository: repo.repository.clone(),
                    source: e,
                });
            }
        };
        let op: Operation = serde_json::from_str(&out).map_err(|e| RegistryError::Parse {
            what: "artifact registry operation",
            source: e,
        })?;
        if op.done {
            return finished(op);
        }
        self.wait_for_operation(repo, &op.name).await
    }
}
