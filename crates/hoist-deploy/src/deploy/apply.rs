use std::collections::BTreeMap;

use hoist_cloud::{ChartEngine, HelmError, Release, ReleaseSummary};
use hoist_core::{Reporter, UserError};

use crate::deploy::{ChartConfig, DeployPlan};
use crate::error::DeployError;

const UPGRADE_FAILED: &str = "Error upgrading chart. It is possible that the existing release is \
     corrupted. Please use --reinstall-on-error to reinstall the release. Warning: this may \
     cause downtime.";

const REINSTALL_UNINSTALL_FAILED: &str = "Could not complete uninstall step of \
     --reinstall-on-error. Please use the helm CLI to uninstall the release manually.";

/// Install or upgrade the runtime, app and external charts, in that order.
///
/// `existing` is the release list taken before the deploy started.
pub async fn apply_charts<H: ChartEngine>(
    plan: &DeployPlan,
    helm: &H,
    existing: &[ReleaseSummary],
    reporter: &dyn Reporter,
) -> Result<BTreeMap<String, Release>, DeployError> {
    let installed = |name: &str| existing.iter().any(|r| r.name == name);
    let mut releases = BTreeMap::new();

    for chart in plan.charts() {
        let release = if installed(&chart.release_name) {
            upgrade_or_reinstall(chart, helm, plan.reinstall_on_error, reporter).await?
        } else if chart.instance_name != chart.release_name && installed(&chart.instance_name) {
            reporter.detail(&format!(
                "Detected old install named {}. Reinstalling it as {}.",
                chart.instance_name, chart.release_name
            ));
            reinstall(chart, &chart.instance_name, helm, reporter).await?
        } else {
            install(chart, helm, reporter).await?
        };
        releases.insert(chart_key(chart), release);
    }

    for chart in &plan.external {
        let release = if installed(&chart.release_name) {
            reporter.step(&format!("Upgrading {}...", chart.release_name));
            helm.upgrade(&chart.request())
                .await
                .map_err(|e| chart_error("upgrade", chart, e))?
        } else {
            install(chart, helm, reporter).await?
        };
        releases.insert(chart.release_name.clone(), release);
    }

    Ok(releases)
}

fn chart_key(chart: &ChartConfig) -> String {
    if chart.chart.name.is_empty() {
        chart.release_name.clone()
    } else {
        chart.chart.name.clone()
    }
}

fn chart_error(action: &'static str, chart: &ChartConfig, source: HelmError) -> DeployError {
    DeployError::Chart {
        action,
        release: chart.release_name.clone(),
        source,
    }
}

async fn install<H: ChartEngine>(
    chart: &ChartConfig,
    helm: &H,
    reporter: &dyn Reporter,
) -> Result<Release, DeployError> {
    reporter.step(&format!("Installing {}...", chart.instance_name));
    let release = helm
        .install(&chart.request())
        .await
        .map_err(|e| chart_error("install", chart, e))?;
    reporter.step(&format!("Successfully installed {}", chart.instance_name));
    Ok(release)
}

async fn upgrade_or_reinstall<H: ChartEngine>(
    chart: &ChartConfig,
    helm: &H,
    reinstall_on_error: bool,
    reporter: &dyn Reporter,
) -> Result<Release, DeployError> {
    reporter.step(&format!("Upgrading {}...", chart.instance_name));
    match helm.upgrade(&chart.request()).await {
        Ok(release) => {
            reporter.step(&format!("Successfully upgraded {}", chart.instance_name));
            Ok(release)
        }
        Err(e) if reinstall_on_error || matches!(e, HelmError::NoDeployedReleases { .. }) => {
            tracing::debug!(error = %e, release = %chart.release_name, "upgrade failed");
            reporter.warn(&format!(
                "Could not upgrade {}. Reinstalling; its release history will be lost.",
                chart.release_name
            ));
            reinstall(chart, &chart.release_name, helm, reporter).await
        }
        Err(e) => Err(DeployError::Upgrade {
            release: chart.release_name.clone(),
            source: UserError::with_cause(UPGRADE_FAILED, e),
        }),
    }
}

/// Uninstall `old_release`, then install `chart`.
async fn reinstall<H: ChartEngine>(
    chart: &ChartConfig,
    old_release: &str,
    helm: &H,
    reporter: &dyn Reporter,
) -> Result<Release, DeployError> {
    helm.uninstall(old_release, &chart.namespace)
        .await
        .map_err(|e| DeployError::Reinstall {
            release: old_release.to_owned(),
            source: UserError::with_cause(REINSTALL_UNINSTALL_FAILED, e),
        })?;
    install(chart, helm, reporter).await
}
