//! Remove an app, and the runtime when no other app needs it.

use hoist_cloud::{ChartEngine, Cluster, ReleaseSummary, WorkloadKind};
use hoist_core::{Reporter, UserError};

use crate::deploy::RUNTIME_RELEASE;
use crate::error::{DownError, list_releases_error};

#[derive(Debug, Clone)]
pub struct DownOptions {
    pub release_name: String,
    pub instance_name: String,
    pub namespace: String,
    /// Releases of external charts installed with the app
    pub external_releases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownPlan {
    pub namespace: String,
    pub instance_name: String,
    /// Hoist releases to remove, app first
    pub releases: Vec<String>,
    pub external_releases: Vec<String>,
    /// Runtime kept because other apps still use it
    pub runtime_kept: bool,
}

/// Decide which releases go. The app release must exist; the runtime is
/// removed only when the app is the last one using it. The app's own
/// external releases do not count as other apps.
pub fn plan_releases(
    options: &DownOptions,
    installed: &[ReleaseSummary],
) -> Result<DownPlan, DownError> {
    let runtime_found = installed.iter().any(|r| r.name == RUNTIME_RELEASE);
    let apps: Vec<&str> = installed
        .iter()
        .filter(|r| r.name != RUNTIME_RELEASE && !options.external_releases.contains(&r.name))
        .map(|r| r.name.as_str())
        .collect();

    if !apps.contains(&options.release_name.as_str()) {
        return Err(DownError::AppNotFound {
            instance: options.instance_name.clone(),
            source: UserError::new(format!(
                "Could not find {} in namespace {}",
                options.instance_name, options.namespace
            )),
        });
    }

    let other_apps = apps.iter().filter(|name| **name != options.release_name).count();
    let mut releases = vec![options.release_name.clone()];
    let remove_runtime = runtime_found && other_apps == 0;
    if remove_runtime {
        releases.push(RUNTIME_RELEASE.to_owned());
    }

    Ok(DownPlan {
        namespace: options.namespace.clone(),
        instance_name: options.instance_name.clone(),
        releases,
        external_releases: options.external_releases.clone(),
        runtime_kept: runtime_found && !remove_runtime,
    })
}

pub async fn compile<H: ChartEngine>(
    helm: &H,
    options: &DownOptions,
    reporter: &dyn Reporter,
) -> Result<DownPlan, DownError> {
    let installed = helm
        .list_releases(&options.namespace)
        .await
        .map_err(|e| DownError::ListReleases {
            namespace: options.namespace.clone(),
            source: list_releases_error(e),
        })?;

    let plan = plan_releases(options, &installed)?;
    if plan.runtime_kept {
        reporter.warn("Found multiple apps installed. Not removing runtime.");
    }
    Ok(plan)
}

/// Uninstall the plan's releases, then delete pods, jobs and cronjobs the
/// app created outside its chart.
pub async fn run<H, C>(
    plan: &DownPlan,
    helm: &H,
    cluster: &C,
    reporter: &dyn Reporter,
) -> Result<(), DownError>
where
    H: ChartEngine,
    C: Cluster,
{
    for release in plan.releases.iter().chain(&plan.external_releases) {
        reporter.step(&format!("Uninstalling {release}..."));
        helm.uninstall(release, &plan.namespace)
            .await
            .map_err(|e| DownError::Uninstall {
                release: release.clone(),
                source: e,
            })?;
        reporter.step(&format!("Successfully uninstalled {release}"));
    }

    let selector = format!("app.kubernetes.io/instance={}", plan.instance_name);
    for kind in [WorkloadKind::Pod, WorkloadKind::Job, WorkloadKind::CronJob] {
        cluster
            .delete_collection(&plan.namespace, &selector, kind)
            .await
            .map_err(|e| DownError::Cleanup {
                instance: plan.instance_name.clone(),
                source: e,
            })?;
    }
    Ok(())
}
