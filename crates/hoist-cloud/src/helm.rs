use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hoist_core::Values;
use serde::Deserialize;

use crate::command::{CommandError, CommandSpec};
use crate::executor::{CommandExecutor, RealExecutor};

/// Chart release operations.
#[allow(async_fn_in_trait)]
pub trait ChartEngine: Send + Sync {
    async fn install(&self, request: &ChartRequest) -> Result<Release, HelmError>;

    async fn upgrade(&self, request: &ChartRequest) -> Result<Release, HelmError>;

    /// Uninstall and wait for the release's resources to be deleted.
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), HelmError>;

    /// Latest revision of `release`, or `None` if it does not exist.
    async fn get_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<Release>, HelmError>;

    /// User-supplied values of the latest revision.
    async fn get_values(&self, release: &str, namespace: &str) -> Result<Values, HelmError>;

    async fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, HelmError>;
}

/// Which chart to install.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartRef {
    pub name: String,
    pub repo_url: Option<String>,
    pub version: Option<String>,
    /// Local chart directory; takes precedence over `name`/`repo_url`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub chart: ChartRef,
    pub release_name: String,
    pub namespace: String,
    pub values: Values,
    pub wait: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: String,
    pub chart_name: String,
    pub chart_version: String,
    pub last_deployed: Option<DateTime<Utc>>,
}

impl Release {
    pub fn is_deployed(&self) -> bool {
        self.status == "deployed"
    }
}

/// One row of `helm list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: String,
    pub chart_name: String,
    pub chart_version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("release {release} not found in namespace {namespace}")]
    ReleaseNotFound { release: String, namespace: String },

    #[error("release {release} has no deployed revisions")]
    NoDeployedReleases {
        release: String,
        source: CommandError,
    },

    #[error("helm {action} {release} failed")]
    Command {
        action: &'static str,
        release: String,
        source: CommandError,
    },

    #[error("failed to parse helm {action} output")]
    Parse {
        action: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to write chart values file")]
    ValuesFile { source: std::io::Error },
}

/// Drives the `helm` CLI with JSON output.
pub struct HelmCli<E: CommandExecutor = RealExecutor> {
    executor: E,
    kube_context: Option<String>,
    driver: Option<String>,
    history_max: u32,
}

impl HelmCli<RealExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealExecutor)
    }
}

impl Default for HelmCli<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> HelmCli<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            kube_context: None,
            // arch-lint: allow(no-silent-result-drop) reason="unset HELM_DRIVER means helm's default storage backend"
            driver: std::env::var("HELM_DRIVER").ok(),
            history_max: 10,
        }
    }

    pub fn kube_context(mut self, context: Option<String>) -> Self {
        self.kube_context = context;
        self
    }

    /// Storage backend for release records (`secret`, `configmap`, ...).
    pub fn driver(mut self, driver: Option<String>) -> Self {
        self.driver = driver;
        self
    }

    pub fn history_max(mut self, max: u32) -> Self {
        self.history_max = max;
        self
    }

    fn helm<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        let mut cmd = CommandSpec::new("helm", args);
        if let Some(context) = &self.kube_context {
            cmd = cmd.arg("--kube-context").arg(context);
        }
        if let Some(driver) = &self.driver {
            cmd = cmd.env("HELM_DRIVER", driver);
        }
        cmd
    }

    async fn apply(
        &self,
        action: &'static str,
        request: &ChartRequest,
    ) -> Result<Release, HelmError> {
        // JSON is valid YAML, so helm reads it as a values file.
        let mut values_file =
            tempfile::NamedTempFile::new().map_err(|e| HelmError::ValuesFile { source: e })?;
        serde_json::to_writer(&mut values_file, request.values.as_json())
            .map_err(|e| HelmError::ValuesFile { source: e.into() })?;
        values_file
            .flush()
            .map_err(|e| HelmError::ValuesFile { source: e })?;

        let chart = match &request.chart.path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => request.chart.name.clone(),
        };
        let timeout = format!("{}s", request.timeout.as_secs());
        let history_max = self.history_max.to_string();

        let mut cmd = self
            .helm([
                action,
                request.release_name.as_str(),
                chart.as_str(),
                "--namespace",
                request.namespace.as_str(),
                "--create-namespace",
                "--history-max",
                history_max.as_str(),
                "--timeout",
                timeout.as_str(),
                "--output",
                "json",
            ])
            .arg("--values")
            .arg(values_file.path().to_string_lossy());
        if request.wait {
            cmd = cmd.arg("--wait");
        }
        if request.chart.path.is_none() {
            if let Some(repo) = &request.chart.repo_url {
                cmd = cmd.arg("--repo").arg(repo);
            }
            if let Some(version) = &request.chart.version {
                cmd = cmd.arg("--version").arg(version);
            }
        }

        tracing::debug!(release = %request.release_name, chart = %chart, action, "applying chart");
        let out = match self.executor.exec(&cmd).await {
            Ok(out) => out,
            Err(e) if e.stderr_contains("has no deployed releases") => {
                return Err(HelmError::NoDeployedReleases {
                    release: request.release_name.clone(),
                    source: e,
                });
            }
            Err(e) => {
                return Err(HelmError::Command {
                    action,
                    release: request.release_name.clone(),
                    source: e,
                });
            }
        };
        parse_release(action, &out)
    }
}

impl<E: CommandExecutor> ChartEngine for HelmCli<E> {
    async fn install(&self, request: &ChartRequest) -> Result<Release, HelmError> {
        self.apply("install", request).await
    }

    async fn upgrade(&self, request: &ChartRequest) -> Result<Release, HelmError> {
        self.apply("upgrade", request).await
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), HelmError> {
        let cmd = self.helm(["uninstall", release, "--namespace", namespace, "--wait"]);
        match self.executor.exec(&cmd).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(HelmError::ReleaseNotFound {
                release: release.to_owned(),
                namespace: namespace.to_owned(),
            }),
            Err(e) => Err(HelmError::Command {
                action: "uninstall",
                release: release.to_owned(),
                source: e,
            }),
        }
    }

    async fn get_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<Release>, HelmError> {
        let cmd = self.helm(["status", release, "--namespace", namespace, "--output", "json"]);
        match self.executor.exec(&cmd).await {
            Ok(out) => parse_release("status", &out).map(Some),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(HelmError::Command {
                action: "status",
                release: release.to_owned(),
                source: e,
            }),
        }
    }

    async fn get_values(&self, release: &str, namespace: &str) -> Result<Values, HelmError> {
        let cmd = self.helm([
            "get", "values", release, "--namespace", namespace, "--output", "json",
        ]);
        let out = self
            .executor
            .exec(&cmd)
            .await
            .map_err(|e| HelmError::Command {
                action: "get values",
                release: release.to_owned(),
                source: e,
            })?;
        let value: serde_json::Value =
            serde_json::from_str(&out).map_err(|e| HelmError::Parse {
                action: "get values",
                source: e,
            })?;
        Ok(Values::from_json(value))
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, HelmError> {
        let cmd = self.helm(["list", "--namespace", namespace, "--all", "--output", "json"]);
        let out = self
            .executor
            .exec(&cmd)
            .await
            .map_err(|e| HelmError::Command {
                action: "list",
                release: String::new(),
                source: e,
            })?;
        let rows: Vec<ListRow> = serde_json::from_str(&out).map_err(|e| HelmError::Parse {
            action: "list",
            source: e,
        })?;
        Ok(rows.into_iter().map(ListRow::into_summary).collect())
    }
}

fn is_not_found(e: &CommandError) -> bool {
    e.stderr_contains("release: not found")
}

// ── JSON shapes ──

#[derive(Deserialize)]
struct ReleaseJson {
    name: String,
    namespace: String,
    version: u32,
    #[serde(default)]
    info: InfoJson,
    #[serde(default)]
    chart: ChartJson,
}

#[derive(Default, Deserialize)]
struct InfoJson {
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_deployed: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChartJson {
    #[serde(default)]
    metadata: ChartMetadataJson,
}

#[derive(Default, Deserialize)]
struct ChartMetadataJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Deserialize)]
struct ListRow {
    name: String,
    namespace: String,
    #[serde(deserialize_with = "revision_from_str")]
    revision: u32,
    #[serde(default)]
    status: String,
    #[serde(default)]
    chart: String,
}

impl ListRow {
    fn into_summary(self) -> ReleaseSummary {
        let (chart_name, chart_version) = split_chart(&self.chart);
        ReleaseSummary {
            name: self.name,
            namespace: self.namespace,
            revision: self.revision,
            status: self.status,
            chart_name,
            chart_version,
        }
    }
}

/// helm prints the revision as a string.
fn revision_from_str<'de, D: serde::Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// `app-0.4.3` into (`app`, `0.4.3`); `my-chart-1.0.0-rc.1` into (`my-chart`, `1.0.0-rc.1`).
fn split_chart(chart: &str) -> (String, String) {
    let mut split_at = None;
    for (i, _) in chart.match_indices('-') {
        if chart[i + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            split_at = Some(i);
            break;
        }
    }
    match split_at {
        Some(i) => (chart[..i].to_owned(), chart[i + 1..].to_owned()),
        None => (chart.to_owned(), String::new()),
    }
}

fn parse_release(action: &'static str, out: &str) -> Result<Release, HelmError> {
    let json: ReleaseJson =
        serde_json::from_str(out).map_err(|e| HelmError::Parse { action, source: e })?;
    let last_deployed = json
        .info
        .last_deployed
        .as_deref()
        // arch-lint: allow(no-silent-result-drop) reason="an unparsable deploy time counts as unknown, which makes the release stale"
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Ok(Release {
        name: json.name,
        namespace: json.namespace,
        revision: json.version,
        status: json.info.status,
        chart_name: json.chart.metadata.name,
        chart_version: json.chart.metadata.version,
        last_deployed,
    })
}
