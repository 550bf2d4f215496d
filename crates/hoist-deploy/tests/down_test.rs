mod common;

use common::{FakeCluster, FakeHelm};
use hoist_cloud::{ReleaseSummary, WorkloadKind};
use hoist_core::{MemoryReporter, user_message};
use hoist_deploy::down::plan_releases;
use hoist_deploy::{DownError, DownOptions, RUNTIME_RELEASE, pipeline};

fn options() -> DownOptions {
    DownOptions {
        release_name: "acme-shop".to_owned(),
        instance_name: "shop".to_owned(),
        namespace: "default".to_owned(),
        external_releases: Vec::new(),
    }
}

fn summary(name: &str) -> ReleaseSummary {
    ReleaseSummary {
        name: name.to_owned(),
        namespace: "default".to_owned(),
        revision: 1,
        status: "deployed".to_owned(),
        chart_name: name.to_owned(),
        chart_version: "1.0.0".to_owned(),
    }
}

#[test]
fn last_app_takes_runtime_with_it() {
    let plan = plan_releases(&options(), &[summary("acme-shop"), summary(RUNTIME_RELEASE)])
        .unwrap();
    assert_eq!(plan.releases, ["acme-shop", RUNTIME_RELEASE]);
    assert!(!plan.runtime_kept);
}

#[test]
fn runtime_stays_while_other_apps_run() {
    let installed = [
        summary("acme-shop"),
        summary("acme-billing"),
        summary(RUNTIME_RELEASE),
    ];
    let plan = plan_releases(&options(), &installed).unwrap();
    assert_eq!(plan.releases, ["acme-shop"]);
    assert!(plan.runtime_kept);
}

#[test]
fn missing_runtime_is_not_removed() {
    let plan = plan_releases(&options(), &[summary("acme-shop")]).unwrap();
    assert_eq!(plan.releases, ["acme-shop"]);
    assert!(!plan.runtime_kept);
}

#[test]
fn missing_app_is_an_error() {
    let err = plan_releases(&options(), &[summary(RUNTIME_RELEASE)]).unwrap_err();
    assert!(matches!(err, DownError::AppNotFound { .. }));
    assert_eq!(
        user_message(&err),
        Some("Could not find shop in namespace default")
    );
}

#[tokio::test]
async fn down_uninstalls_and_cleans_workloads() {
    let helm = FakeHelm::new()
        .with_release("acme-shop", 2)
        .with_release(RUNTIME_RELEASE, 1)
        .with_release("metrics", 1);
    let cluster = FakeCluster::new();
    let mut options = options();
    options.external_releases = vec!["metrics".to_owned()];
    let reporter = MemoryReporter::new();

    pipeline::down(&helm, &cluster, &options, &reporter).await.unwrap();

    assert_eq!(
        helm.calls(),
        ["uninstall acme-shop", "uninstall hoist-runtime", "uninstall metrics"]
    );
    let selector = "app.kubernetes.io/instance=shop".to_owned();
    assert_eq!(
        cluster.deleted(),
        [
            (selector.clone(), WorkloadKind::Pod),
            (selector.clone(), WorkloadKind::Job),
            (selector, WorkloadKind::CronJob),
        ]
    );
}

#[tokio::test]
async fn down_keeps_runtime_shared_with_other_apps() {
    let helm = FakeHelm::new()
        .with_release("acme-shop", 2)
        .with_release("acme-billing", 4)
        .with_release(RUNTIME_RELEASE, 1);
    let reporter = MemoryReporter::new();

    pipeline::down(&helm, &FakeCluster::new(), &options(), &reporter)
        .await
        .unwrap();

    assert_eq!(helm.calls(), ["uninstall acme-shop"]);
    assert_eq!(
        reporter.warnings(),
        ["Found multiple apps installed. Not removing runtime."]
    );
}

#[tokio::test]
async fn down_of_only_app_removes_runtime() {
    let helm = FakeHelm::new()
        .with_release("acme-shop", 2)
        .with_release(RUNTIME_RELEASE, 1);
    let cluster = FakeCluster::new();
    let reporter = MemoryReporter::new();

    pipeline::down(&helm, &cluster, &options(), &reporter).await.unwrap();

    assert_eq!(
        helm.calls(),
        ["uninstall acme-shop", "uninstall hoist-runtime"]
    );
    assert!(reporter.warnings().is_empty());
}

#[tokio::test]
async fn down_without_cluster_access_reports_permissions() {
    let helm = FakeHelm {
        list_fails: true,
        ..FakeHelm::new()
    };
    let cluster = FakeCluster::new();

    let err = pipeline::down(&helm, &cluster, &options(), &MemoryReporter::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DownError::ListReleases { .. }));
    assert!(user_message(&err).unwrap().contains("refresh your credentials"));
    assert!(cluster.deleted().is_empty());
}
