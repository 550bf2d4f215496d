//! Deploy: compile chart configs from options, then apply them while
//! watching the new app pods.
//!
//! ```text
//! compile   app values = defaults < value files < --set
//!           runtime    = skipped if current, else secrets fetched late
//! validate  every chart has a name, release, instance and namespace
//! run       list releases ─┬─ apply: runtime → app → external charts
//!                          └─ watch: pods of the next app revision
//! ```

mod apply;
pub mod currency;
pub mod values;
pub mod watch;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hoist_cloud::{ChartEngine, ChartRef, ChartRequest, Cluster, Release};
use hoist_core::{Environment, Reporter, Values};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, list_releases_error};
use currency::{CurrencyChecker, RecordedRelease};
use values::{AppDefaults, LATE_SECRET_PATHS};

pub use apply::apply_charts;

/// Chart name of the app chart, also its `app.kubernetes.io/name` label.
pub const APP_CHART_NAME: &str = "app";
/// Release, chart and secret name of the shared runtime.
pub const RUNTIME_RELEASE: &str = "hoist-runtime";

/// An additional chart installed next to the app.
#[derive(Debug, Clone)]
pub struct ExternalChart {
    pub chart: ChartRef,
    pub release: String,
    pub values: Values,
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Name resources inherit, `app.kubernetes.io/instance`
    pub instance_name: String,
    /// Release name of the app chart
    pub release_name: String,
    pub namespace: String,
    pub environment: Environment,
    /// Remote image reference to run
    pub image: Option<String>,
    pub app_chart: ChartRef,
    /// `None` skips the runtime chart
    pub runtime_chart: Option<ChartRef>,
    /// User overrides of the runtime chart values
    pub runtime_values: Values,
    pub external_charts: Vec<ExternalChart>,
    /// Values files merged over the app defaults, in order
    pub value_files: Vec<PathBuf>,
    /// `path=value` overrides, applied last
    pub set_values: Vec<String>,
    /// Variables stored as app secrets
    pub env_vars: BTreeMap<String, String>,
    pub env_file: Option<PathBuf>,
    pub secret_files: Vec<PathBuf>,
    pub is_local_cluster: bool,
    pub reinstall_on_error: bool,
    pub timeout: Duration,
    pub watch_timeout: Duration,
    pub release_freshness: TimeDelta,
}

impl DeployOptions {
    pub fn new(
        instance_name: impl Into<String>,
        release_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            release_name: release_name.into(),
            namespace: namespace.into(),
            environment: Environment::default(),
            image: None,
            app_chart: ChartRef {
                name: APP_CHART_NAME.to_owned(),
                ..ChartRef::default()
            },
            runtime_chart: None,
            runtime_values: Values::new(),
            external_charts: Vec::new(),
            value_files: Vec::new(),
            set_values: Vec::new(),
            env_vars: BTreeMap::new(),
            env_file: None,
            secret_files: Vec::new(),
            is_local_cluster: false,
            reinstall_on_error: false,
            timeout: Duration::from_secs(60),
            watch_timeout: Duration::from_secs(600),
            release_freshness: TimeDelta::hours(24),
        }
    }
}

/// One chart to install or upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub chart: ChartRef,
    pub release_name: String,
    pub instance_name: String,
    pub namespace: String,
    pub values: Values,
    pub wait: bool,
    pub timeout: Duration,
}

impl ChartConfig {
    pub fn request(&self) -> ChartRequest {
        ChartRequest {
            chart: self.chart.clone(),
            release_name: self.release_name.clone(),
            namespace: self.namespace.clone(),
            values: self.values.clone(),
            wait: self.wait,
            timeout: self.timeout,
        }
    }

    fn validate(&self) -> Result<(), DeployError> {
        let missing = [
            (self.chart.name.is_empty() && self.chart.path.is_none(), "a chart name"),
            (self.release_name.is_empty(), "a release name"),
            (self.instance_name.is_empty(), "an instance name"),
            (self.namespace.is_empty(), "a namespace"),
        ];
        match missing.iter().find(|(is_missing, _)| *is_missing) {
            Some((_, field)) => Err(DeployError::InvalidChart {
                chart: self.release_name.clone(),
                field: *field,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub app: ChartConfig,
    /// Absent when not requested or already current
    pub runtime: Option<ChartConfig>,
    pub external: Vec<ChartConfig>,
    pub reinstall_on_error: bool,
    pub watch_timeout: Duration,
}

impl DeployPlan {
    /// Runtime first, then the app.
    pub fn charts(&self) -> impl Iterator<Item = &ChartConfig> {
        self.runtime.iter().chain(std::iter::once(&self.app))
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        self.charts()
            .chain(self.external.iter())
            .try_for_each(ChartConfig::validate)
    }
}

#[derive(Debug, Clone)]
pub struct DeployOutput {
    pub namespace: String,
    pub instance_name: String,
    /// Keyed by chart name for hoist charts, release name for external ones
    pub releases: BTreeMap<String, Release>,
    pub duration: Duration,
}

/// Compute the app values and decide about the runtime chart.
pub async fn compile<H, C>(
    helm: &H,
    cluster: &C,
    options: &DeployOptions,
    reporter: &dyn Reporter,
    now: DateTime<Utc>,
) -> Result<DeployPlan, DeployError>
where
    H: ChartEngine,
    C: Cluster,
{
    let app = ChartConfig {
        chart: options.app_chart.clone(),
        release_name: options.release_name.clone(),
        instance_name: options.instance_name.clone(),
        namespace: options.namespace.clone(),
        values: app_values(options)?,
        wait: true,
        timeout: options.timeout,
    };

    let runtime = match &options.runtime_chart {
        Some(chart) => runtime_config(helm, cluster, options, chart, reporter, now).await?,
        None => None,
    };

    let external = options
        .external_charts
        .iter()
        .map(|ext| ChartConfig {
            chart: ext.chart.clone(),
            release_name: ext.release.clone(),
            instance_name: ext.release.clone(),
            namespace: options.namespace.clone(),
            values: ext.values.clone(),
            wait: false,
            timeout: options.timeout,
        })
        .collect();

    Ok(DeployPlan {
        app,
        runtime,
        external,
        reinstall_on_error: options.reinstall_on_error,
        watch_timeout: options.watch_timeout,
    })
}

/// App chart values: computed defaults, then value files, then `--set`.
pub fn app_values(options: &DeployOptions) -> Result<Values, DeployError> {
    let mut env_vars = options.env_vars.clone();
    if let Some(path) = &options.env_file {
        env_vars.extend(values::load_env_file(path)?);
    }
    let secret_files = values::load_secret_files(&options.secret_files)?;

    let mut app = values::app_defaults(&AppDefaults {
        instance_name: &options.instance_name,
        environment: options.environment,
        image: options.image.as_deref(),
        env_vars: &env_vars,
        secret_files: &secret_files,
    });
    for path in &options.value_files {
        let file = Values::from_yaml_file(path).map_err(|e| DeployError::Values { source: e })?;
        app.merge(&file);
    }
    let set = Values::from_set_expressions(&options.set_values)
        .map_err(|e| DeployError::Values { source: e })?;
    app.merge(&set);
    Ok(app)
}

async fn runtime_config<H, C>(
    helm: &H,
    cluster: &C,
    options: &DeployOptions,
    chart: &ChartRef,
    reporter: &dyn Reporter,
    now: DateTime<Utc>,
) -> Result<Option<ChartConfig>, DeployError>
where
    H: ChartEngine,
    C: Cluster,
{
    let mut runtime_values = values::runtime_defaults(RUNTIME_RELEASE, options.is_local_cluster);
    runtime_values.merge(&options.runtime_values);

    let mut config = ChartConfig {
        chart: chart.clone(),
        release_name: RUNTIME_RELEASE.to_owned(),
        instance_name: RUNTIME_RELEASE.to_owned(),
        namespace: options.namespace.clone(),
        values: runtime_values,
        wait: true,
        timeout: options.timeout,
    };

    let checker = CurrencyChecker::new(options.release_freshness).ignoring(LATE_SECRET_PATHS);
    let recorded = match recorded_release(helm, &config).await {
        Ok(recorded) => recorded,
        Err(e) => {
            tracing::debug!(error = %e, "could not read runtime release, upgrading it");
            None
        }
    };
    if checker.is_current(
        recorded.as_ref(),
        config.chart.version.as_deref(),
        &config.values,
        now,
    ) {
        reporter.detail(&format!(
            "Skipping upgrade of {} because there are no changes",
            config.release_name
        ));
        return Ok(None);
    }

    // Secrets are added after the currency check so they are never compared.
    let secret = cluster
        .secret_data(&options.namespace, RUNTIME_RELEASE)
        .await
        .map_err(|e| DeployError::RuntimeSecret { source: e })?;
    values::apply_runtime_secrets(&mut config.values, &secret)?;
    Ok(Some(config))
}

async fn recorded_release<H: ChartEngine>(
    helm: &H,
    config: &ChartConfig,
) -> Result<Option<RecordedRelease>, hoist_cloud::HelmError> {
    let Some(release) = helm
        .get_release(&config.release_name, &config.namespace)
        .await?
    else {
        return Ok(None);
    };
    let values = helm
        .get_values(&config.release_name, &config.namespace)
        .await?;
    Ok(Some(RecordedRelease { release, values }))
}

/// Apply the plan's charts while watching the next app revision's pods.
pub async fn run<H, C>(
    plan: &DeployPlan,
    helm: &H,
    cluster: &C,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<DeployOutput, DeployError>
where
    H: ChartEngine,
    C: Cluster,
{
    let start = Instant::now();
    let namespace = &plan.app.namespace;

    let existing = helm
        .list_releases(namespace)
        .await
        .map_err(|e| DeployError::ListReleases {
            namespace: namespace.clone(),
            source: list_releases_error(e),
        })?;

    let revision = existing
        .iter()
        .find(|r| r.name == plan.app.release_name)
        .map_or(1, |r| r.revision + 1);
    let selector = watch::pod_selector(&plan.app.instance_name, revision);
    let events = cluster
        .watch_pods(namespace, &selector)
        .await
        .map_err(|e| DeployError::Watch { source: e })?;

    let releases = watch::race(
        apply_charts(plan, helm, &existing, reporter),
        watch::first_crash(events, plan.watch_timeout),
        cancel,
    )
    .await?;

    Ok(DeployOutput {
        namespace: namespace.clone(),
        instance_name: plan.app.instance_name.clone(),
        releases,
        duration: start.elapsed(),
    })
}
