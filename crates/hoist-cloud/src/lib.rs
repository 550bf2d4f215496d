pub mod cluster;
pub mod command;
pub mod docker;
pub mod executor;
pub mod helm;
pub mod registry;

pub use cluster::{
    Cluster, ClusterError, ContainerWaiting, KubeCluster, PodEvent, WorkloadKind, current_context,
    is_local_context,
};
pub use command::{CommandError, CommandSpec};
pub use docker::{BuildRequest, DockerCli, DockerEngine, DockerError, ImageInfo};
pub use executor::{CommandExecutor, RealExecutor};
pub use helm::{ChartEngine, ChartRef, ChartRequest, HelmCli, HelmError, Release, ReleaseSummary};
pub use registry::{
    ImageRegistry, RegistryApi, RegistryClient, RegistryCredentials, RegistryError, RegistryKind,
};
