use std::collections::BTreeMap;
use std::fmt;

use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::KubeConfigOptions;
use kube::runtime::watcher;

/// Direct Kubernetes API access needed around chart operations.
#[allow(async_fn_in_trait)]
pub trait Cluster: Send + Sync {
    /// Stream of pod updates matching `selector`, starting with current pods.
    async fn watch_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<BoxStream<'static, Result<PodEvent, ClusterError>>, ClusterError>;

    async fn delete_collection(
        &self,
        namespace: &str,
        selector: &str,
        kind: WorkloadKind,
    ) -> Result<(), ClusterError>;

    /// Decoded data of a secret; empty if the secret does not exist.
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, ClusterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Job,
    CronJob,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pod => "pods",
            Self::Job => "jobs",
            Self::CronJob => "cronjobs",
        })
    }
}

/// A pod's state as seen by the watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodEvent {
    pub pod: String,
    pub waiting: Vec<ContainerWaiting>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerWaiting {
    pub container: String,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to load kubeconfig")]
    Kubeconfig {
        source: kube::config::KubeconfigError,
    },

    #[error("failed to infer cluster configuration")]
    InferConfig {
        source: kube::config::InferConfigError,
    },

    #[error("failed to create Kubernetes client")]
    Client { source: kube::Error },

    #[error("failed to {action} in namespace {namespace}")]
    Api {
        action: String,
        namespace: String,
        source: kube::Error,
    },

    #[error("pod watch failed")]
    Watch { source: watcher::Error },
}

/// [`Cluster`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    /// Connect using `context` from the kubeconfig, or the inferred default.
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_owned()),
                    ..KubeConfigOptions::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Kubeconfig { source: e })?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| ClusterError::InferConfig { source: e })?,
        };
        let client =
            kube::Client::try_from(config).map_err(|e| ClusterError::Client { source: e })?;
        Ok(Self { client })
    }

    pub fn with_client(client: kube::Client) -> Self {
        Self { client }
    }
}

/// Current context of the default kubeconfig.
pub fn current_context() -> Option<String> {
    match kube::config::Kubeconfig::read() {
        Ok(config) => config.current_context,
        Err(e) => {
            tracing::debug!(error = %e, "kubeconfig not readable");
            None
        }
    }
}

/// Whether `context` names a cluster running on this machine.
pub fn is_local_context(context: &str) -> bool {
    matches!(
        context,
        "docker-desktop" | "docker-for-desktop" | "minikube" | "rancher-desktop" | "orbstack"
    ) || context.starts_with("kind-")
        || context.starts_with("k3d-")
}

impl Cluster for KubeCluster {
    async fn watch_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<BoxStream<'static, Result<PodEvent, ClusterError>>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        // Fail fast on RBAC or connectivity problems instead of inside the stream.
        pods.list(&ListParams::default().labels(selector).limit(1))
            .await
            .map_err(|e| ClusterError::Api {
                action: "list pods".to_owned(),
                namespace: namespace.to_owned(),
                source: e,
            })?;

        let config = watcher::Config::default().labels(selector);
        let stream = watcher(pods, config).filter_map(|event| async move {
            match event {
                Ok(watcher::Event::Apply(pod) | watcher::Event::InitApply(pod)) => {
                    Some(Ok(pod_event(&pod)))
                }
                Ok(_) => None,
                Err(e) => Some(Err(ClusterError::Watch { source: e })),
            }
        });
        Ok(stream.boxed())
    }

    async fn delete_collection(
        &self,
        namespace: &str,
        selector: &str,
        kind: WorkloadKind,
    ) -> Result<(), ClusterError> {
        let lp = ListParams::default().labels(selector);
        let dp = DeleteParams::background();
        let result = match kind {
            WorkloadKind::Pod => Api::<Pod>::namespaced(self.client.clone(), namespace)
                .delete_collection(&dp, &lp)
                .await
                .map(|_| ()),
            WorkloadKind::Job => Api::<Job>::namespaced(self.client.clone(), namespace)
                .delete_collection(&dp, &lp)
                .await
                .map(|_| ()),
            WorkloadKind::CronJob => Api::<CronJob>::namespaced(self.client.clone(), namespace)
                .delete_collection(&dp, &lp)
                .await
                .map(|_| ()),
        };
        tracing::debug!(%kind, namespace, selector, ok = result.is_ok(), "delete collection");
        result.map_err(|e| ClusterError::Api {
            action: format!("delete {kind}"),
            namespace: namespace.to_owned(),
            source: e,
        })
    }

    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, ClusterError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get_opt(name).await.map_err(|e| ClusterError::Api {
            action: format!("read secret {name}"),
            namespace: namespace.to_owned(),
            source: e,
        })?;
        Ok(secret
            .and_then(|s| s.data)
            // arch-lint: allow(no-silent-result-drop) reason="a missing secret or one without data has no keys"
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect())
    }
}

fn pod_event(pod: &Pod) -> PodEvent {
    let status = pod.status.as_ref();
    let statuses = status
        .and_then(|s| s.init_container_statuses.as_ref())
        .into_iter()
        .flatten()
        .chain(
            status
                .and_then(|s| s.container_statuses.as_ref())
                .into_iter()
                .flatten(),
        );

    let waiting = statuses
        .filter_map(|cs| {
            let waiting = cs.state.as_ref()?.waiting.as_ref()?;
            Some(ContainerWaiting {
                container: cs.name.clone(),
                // arch-lint: allow(no-silent-result-drop) reason="kubernetes may omit the waiting reason and message"
                reason: waiting.reason.clone().unwrap_or_default(),
                // arch-lint: allow(no-silent-result-drop) reason="kubernetes may omit the waiting reason and message"
                message: waiting.message.clone().unwrap_or_default(),
            })
        })
        .collect();

    PodEvent {
        // arch-lint: allow(no-silent-result-drop) reason="watch events always carry a pod name; empty only for malformed objects"
        pod: pod.metadata.name.clone().unwrap_or_default(),
        waiting,
    }
}
