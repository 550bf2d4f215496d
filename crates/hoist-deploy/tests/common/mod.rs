#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use hoist_cloud::command::{CommandError, CommandSpec};
use hoist_cloud::executor::CommandExecutor;
use hoist_cloud::registry::{EcrHost, GcpRepository};
use hoist_cloud::{
    BuildRequest, ChartEngine, ChartRequest, Cluster, ClusterError, ContainerWaiting,
    DockerEngine, DockerError, HelmError, ImageInfo, PodEvent, RegistryApi, RegistryCredentials,
    RegistryError, Release, ReleaseSummary, WorkloadKind,
};
use hoist_core::Values;

pub fn command_failed(program: &str, stderr: &str) -> CommandError {
    CommandError::CommandFailed {
        program: program.to_owned(),
        args: vec![],
        stderr: stderr.to_owned(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ── Helm ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeFailure {
    NoDeployedReleases,
    Other,
}

#[derive(Default)]
pub struct FakeHelm {
    pub installed: Mutex<BTreeMap<String, (Release, Values)>>,
    pub calls: Mutex<Vec<String>>,
    pub upgrade_failures: Mutex<BTreeMap<String, UpgradeFailure>>,
    pub uninstall_fails: bool,
    pub list_fails: bool,
    /// How long install/upgrade take
    pub apply_delay: Duration,
}

impl FakeHelm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `name` is installed at `revision`.
    pub fn with_release(self, name: &str, revision: u32) -> Self {
        lock(&self.installed).insert(
            name.to_owned(),
            (
                release(name, revision, "deployed", "0.0.0"),
                Values::new(),
            ),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn values_of(&self, name: &str) -> Option<Values> {
        lock(&self.installed).get(name).map(|(_, v)| v.clone())
    }

    pub fn fail_upgrade(&self, name: &str, failure: UpgradeFailure) {
        lock(&self.upgrade_failures).insert(name.to_owned(), failure);
    }

    async fn apply(&self, action: &str, request: &ChartRequest) -> Release {
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        lock(&self.calls).push(format!("{action} {}", request.release_name));
        let mut installed = lock(&self.installed);
        let revision = installed
            .get(&request.release_name)
            .map_or(1, |(r, _)| r.revision + 1);
        let release = release(
            &request.release_name,
            revision,
            "deployed",
            request.chart.version.as_deref().unwrap_or_default(),
        );
        installed.insert(
            request.release_name.clone(),
            (release.clone(), request.values.clone()),
        );
        release
    }
}

pub fn release(name: &str, revision: u32, status: &str, version: &str) -> Release {
    Release {
        name: name.to_owned(),
        namespace: "default".to_owned(),
        revision,
        status: status.to_owned(),
        chart_name: name.to_owned(),
        chart_version: version.to_owned(),
        last_deployed: Some(Utc::now()),
    }
}

impl ChartEngine for FakeHelm {
    async fn install(&self, request: &ChartRequest) -> Result<Release, HelmError> {
        Ok(self.apply("install", request).await)
    }

    async fn upgrade(&self, request: &ChartRequest) -> Result<Release, HelmError> {
        let failure = lock(&self.upgrade_failures).get(&request.release_name).copied();
        match failure {
            Some(UpgradeFailure::NoDeployedReleases) => {
                lock(&self.calls).push(format!("upgrade-failed {}", request.release_name));
                Err(HelmError::NoDeployedReleases {
                    release: request.release_name.clone(),
                    source: command_failed("helm", "has no deployed releases"),
                })
            }
            Some(UpgradeFailure::Other) => {
                lock(&self.calls).push(format!("upgrade-failed {}", request.release_name));
                Err(HelmError::Command {
                    action: "upgrade",
                    release: request.release_name.clone(),
                    source: command_failed("helm", "timed out waiting for the condition"),
                })
            }
            None => Ok(self.apply("upgrade", request).await),
        }
    }

    async fn uninstall(&self, release: &str, _namespace: &str) -> Result<(), HelmError> {
        lock(&self.calls).push(format!("uninstall {release}"));
        if self.uninstall_fails {
            return Err(HelmError::Command {
                action: "uninstall",
                release: release.to_owned(),
                source: command_failed("helm", "uninstall: Release not loaded"),
            });
        }
        lock(&self.installed).remove(release);
        Ok(())
    }

    async fn get_release(
        &self,
        release: &str,
        _namespace: &str,
    ) -> Result<Option<Release>, HelmError> {
        Ok(lock(&self.installed).get(release).map(|(r, _)| r.clone()))
    }

    async fn get_values(&self, release: &str, namespace: &str) -> Result<Values, HelmError> {
        lock(&self.installed)
            .get(release)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| HelmError::ReleaseNotFound {
                release: release.to_owned(),
                namespace: namespace.to_owned(),
            })
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<ReleaseSummary>, HelmError> {
        if self.list_fails {
            return Err(HelmError::Command {
                action: "list",
                release: String::new(),
                source: command_failed("helm", "Kubernetes cluster unreachable"),
            });
        }
        Ok(lock(&self.installed)
            .values()
            .map(|(r, _)| ReleaseSummary {
                name: r.name.clone(),
                namespace: namespace.to_owned(),
                revision: r.revision,
                status: r.status.clone(),
                chart_name: r.chart_name.clone(),
                chart_version: r.chart_version.clone(),
            })
            .collect())
    }
}

// ── Cluster ──

#[derive(Default)]
pub struct FakeCluster {
    /// Pod events emitted once `event_delay` has passed
    pub events: Vec<PodEvent>,
    pub event_delay: Duration,
    /// End the stream after the events instead of staying open
    pub end_stream: bool,
    pub secret: BTreeMap<String, Vec<u8>>,
    pub selectors: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<(String, WorkloadKind)>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crash(mut self, reason: &str, delay: Duration) -> Self {
        self.events.push(PodEvent {
            pod: "app-7d9f-abcde".to_owned(),
            waiting: vec![ContainerWaiting {
                container: "app".to_owned(),
                reason: reason.to_owned(),
                message: "exec: \"./server\": not found".to_owned(),
            }],
        });
        self.event_delay = delay;
        self
    }

    pub fn selectors(&self) -> Vec<String> {
        lock(&self.selectors).clone()
    }

    pub fn deleted(&self) -> Vec<(String, WorkloadKind)> {
        lock(&self.deleted).clone()
    }
}

impl Cluster for FakeCluster {
    async fn watch_pods(
        &self,
        _namespace: &str,
        selector: &str,
    ) -> Result<BoxStream<'static, Result<PodEvent, ClusterError>>, ClusterError> {
        lock(&self.selectors).push(selector.to_owned());
        let events = stream::iter(self.events.clone().into_iter().map(Ok));
        let stream = if self.event_delay.is_zero() {
            events.boxed()
        } else {
            stream::once(tokio::time::sleep(self.event_delay))
                .filter_map(|()| async { None::<Result<PodEvent, ClusterError>> })
                .chain(events)
                .boxed()
        };
        if self.end_stream {
            Ok(stream.boxed())
        } else {
            Ok(stream.chain(stream::pending()).boxed())
        }
    }

    async fn delete_collection(
        &self,
        _namespace: &str,
        selector: &str,
        kind: WorkloadKind,
    ) -> Result<(), ClusterError> {
        lock(&self.deleted).push((selector.to_owned(), kind));
        Ok(())
    }

    async fn secret_data(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, ClusterError> {
        Ok(self.secret.clone())
    }
}

// ── Docker ──

#[derive(Default)]
pub struct FakeDocker {
    pub calls: Mutex<Vec<String>>,
    pub architecture: String,
    /// Number of pushes of the tagged image that fail before one succeeds
    pub push_failures: Mutex<u32>,
    pub latest_push_fails: bool,
    pub missing_images: Vec<String>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self {
            architecture: "amd64".to_owned(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

impl DockerEngine for FakeDocker {
    async fn version(&self) -> Result<String, DockerError> {
        Ok("27.0.0".to_owned())
    }

    async fn build(&self, request: &BuildRequest) -> Result<(), DockerError> {
        self.record(format!("build {}", request.tags.join(",")));
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), DockerError> {
        if self.missing_images.iter().any(|m| m == source) {
            return Err(DockerError::ImageNotFound {
                image: source.to_owned(),
                source: hoist_core::UserError::new(format!(
                    "Image {source} not found. If you want to publish a remote image, \
                     please pull it first."
                )),
            });
        }
        self.record(format!("tag {source} {target}"));
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<(), DockerError> {
        self.record(format!("push {image}"));
        let failing = if image.ends_with(":latest") {
            self.latest_push_fails
        } else {
            let mut remaining = lock(&self.push_failures);
            let fail = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            fail
        };
        if failing {
            return Err(DockerError::Command {
                action: "push",
                source: command_failed("docker", "net/http: TLS handshake timeout"),
            });
        }
        Ok(())
    }

    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
    ) -> Result<(), DockerError> {
        self.record(format!("login {registry_host} {}", credentials.username));
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, DockerError> {
        let json = format!(
            r#"{{"Id":"sha256:{image}","Created":"2024-01-01T00:00:00Z","Architecture":"{}"}}"#,
            self.architecture
        );
        serde_json::from_str(&json).map_err(|e| DockerError::Parse {
            action: "image inspect",
            source: e,
        })
    }

    async fn list_images_by_label(
        &self,
        _key: &str,
        _value: &str,
    ) -> Result<Vec<ImageInfo>, DockerError> {
        Ok(Vec::new())
    }

    async fn remove_image(&self, id: &str) -> Result<(), DockerError> {
        self.record(format!("rmi {id}"));
        Ok(())
    }
}

// ── Registry ──

#[derive(Default)]
pub struct FakeRegistry {
    pub ensured: Mutex<Vec<String>>,
    pub local: Option<(String, String)>,
}

impl RegistryApi for FakeRegistry {
    async fn ecr_credentials(&self, _host: &EcrHost) -> Result<RegistryCredentials, RegistryError> {
        Ok(RegistryCredentials::new("AWS", "ecr-token"))
    }

    async fn gcp_credentials(&self) -> Result<RegistryCredentials, RegistryError> {
        Ok(RegistryCredentials::new("oauth2accesstoken", "gcp-token"))
    }

    async fn local_credentials(
        &self,
        _host: &str,
    ) -> Result<Option<RegistryCredentials>, RegistryError> {
        Ok(self
            .local
            .as_ref()
            .map(|(user, pass)| RegistryCredentials::new(user.as_str(), pass.as_str())))
    }

    async fn ensure_ecr_repository(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<(), RegistryError> {
        lock(&self.ensured).push(format!("ecr {}/{repository}", host.host));
        Ok(())
    }

    async fn ensure_gcp_repository(&self, repository: &GcpRepository) -> Result<(), RegistryError> {
        lock(&self.ensured).push(format!("gcp {}", repository.repository));
        Ok(())
    }
}

// ── Shell ──

#[derive(Default)]
pub struct FakeShell {
    pub scripts: Mutex<Vec<String>>,
}

impl CommandExecutor for FakeShell {
    async fn exec(&self, cmd: &CommandSpec) -> Result<String, CommandError> {
        lock(&self.scripts).push(cmd.args.join(" "));
        Ok(String::new())
    }

    async fn exec_streaming(&self, cmd: &CommandSpec) -> Result<(), CommandError> {
        lock(&self.scripts).push(cmd.args.join(" "));
        Ok(())
    }
}
