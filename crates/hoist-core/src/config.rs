use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Environment;

pub const CONFIG_FILE: &str = "hoist.toml";

/// hoist.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoistConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    /// Per-service build definitions, keyed by service name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// App name (defaults to the project directory name)
    pub name: Option<String>,
    /// Stable identifier stamped on every image built for this project
    pub id: Option<String>,
    /// Image repository to publish to, e.g. `123.dkr.ecr.us-east-1.amazonaws.com/app`
    pub image_repository: Option<String>,
    /// Kubernetes namespace (defaults to `default`)
    pub namespace: Option<String>,
    /// kubeconfig context to use instead of the current one
    pub kube_context: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Prebuilt image; services with an image skip the Dockerfile build
    pub image: Option<String>,
    /// Shell command that builds this service
    pub build_command: Option<String>,
    /// Working directory for `build_command`, relative to the project
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target platform passed to `docker build --platform`
    #[serde(default)]
    pub platform: Option<String>,
    /// Build arguments passed as `--build-arg KEY=VALUE`
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Reuse layers from `<repository>:latest`
    #[serde(default)]
    pub remote_cache: bool,
    /// Upper bound on time spent retrying lost BuildKit sessions
    #[serde(default = "default_session_retry_secs")]
    pub session_retry_max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_push_attempts")]
    pub push_attempts: u32,
    #[serde(default = "default_push_retry_delay_secs")]
    pub push_retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Helm repository hosting the app and runtime charts
    #[serde(default = "default_chart_repo_url")]
    pub chart_repo_url: String,
    #[serde(default = "default_chart_version")]
    pub app_chart_version: String,
    #[serde(default = "default_chart_version")]
    pub runtime_chart_version: String,
    /// Local chart directory used instead of the published app chart
    #[serde(default)]
    pub app_chart_path: Option<PathBuf>,
    /// Install the shared runtime chart alongside the app
    #[serde(default = "default_true")]
    pub install_runtime: bool,
    #[serde(default = "default_helm_timeout_secs")]
    pub helm_timeout_secs: u64,
    #[serde(default = "default_history_max")]
    pub history_max: u32,
    /// A release older than this is redeployed even if nothing changed
    #[serde(default = "default_release_freshness_hours")]
    pub release_freshness_hours: i64,
    /// How long pods are watched for crash loops during a deploy
    #[serde(default = "default_watch_timeout_secs")]
    pub watch_timeout_secs: u64,
    /// Values files merged into the app chart values, in order
    #[serde(default)]
    pub value_files: Vec<PathBuf>,
    /// Files mounted into the app as secrets, keyed by file name
    #[serde(default)]
    pub secret_files: Vec<PathBuf>,
    /// Dotenv file whose variables become app secrets
    #[serde(default)]
    pub env_file: Option<PathBuf>,
    /// Additional charts installed with the app
    #[serde(default)]
    pub external_charts: Vec<ExternalChartConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalChartConfig {
    /// Chart reference, e.g. `bitnami/postgresql` or a local path
    pub chart: String,
    pub release: String,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub value_files: Vec<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            platform: None,
            args: BTreeMap::new(),
            remote_cache: false,
            session_retry_max_elapsed_secs: default_session_retry_secs(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            push_attempts: default_push_attempts(),
            push_retry_delay_secs: default_push_retry_delay_secs(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            chart_repo_url: default_chart_repo_url(),
            app_chart_version: default_chart_version(),
            runtime_chart_version: default_chart_version(),
            app_chart_path: None,
            install_runtime: true,
            helm_timeout_secs: default_helm_timeout_secs(),
            history_max: default_history_max(),
            release_freshness_hours: default_release_freshness_hours(),
            watch_timeout_secs: default_watch_timeout_secs(),
            value_files: Vec::new(),
            secret_files: Vec::new(),
            env_file: None,
            external_charts: Vec::new(),
        }
    }
}

impl HoistConfig {
    /// Load from hoist.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// App name from config, falling back to the project directory name.
    pub fn app_name(&self, project_dir: &Path) -> String {
        if let Some(name) = &self.project.name {
            return name.clone();
        }
        project_dir
            .canonicalize()
            // arch-lint: allow(no-silent-result-drop) reason="an unresolvable project dir falls back to the default app name"
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            // arch-lint: allow(no-silent-result-drop) reason="an unresolvable project dir falls back to the default app name"
            .unwrap_or_else(|| "app".to_owned())
    }

    pub fn namespace(&self) -> &str {
        // arch-lint: allow(no-silent-result-drop) reason="kubernetes default namespace"
        self.project.namespace.as_deref().unwrap_or("default")
    }
}

impl BuildConfig {
    pub fn session_retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.session_retry_max_elapsed_secs)
    }
}

impl PublishConfig {
    pub fn push_retry_delay(&self) -> Duration {
        Duration::from_secs(self.push_retry_delay_secs)
    }
}

impl DeployConfig {
    pub fn helm_timeout(&self) -> Duration {
        Duration::from_secs(self.helm_timeout_secs)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_session_retry_secs() -> u64 {
    180
}

fn default_push_attempts() -> u32 {
    3
}

fn default_push_retry_delay_secs() -> u64 {
    5
}

fn default_chart_repo_url() -> String {
    "https://charts.hoist.dev".to_owned()
}

fn default_chart_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

fn default_helm_timeout_secs() -> u64 {
    60
}

fn default_history_max() -> u32 {
    10
}

fn default_release_freshness_hours() -> i64 {
    24
}

fn default_watch_timeout_secs() -> u64 {
    600
}
