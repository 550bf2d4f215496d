//! Compile, validate and run each operation; chain them for `up`.
//!
//! ```text
//! hoist up
//!   1. Build   ── service commands, docker build, image GC
//!   2. Publish ── resolve registry, tag, push (+ latest)
//!   3. Deploy  ── runtime chart → app chart → external charts, pods watched
//! ```

use std::time::Duration;

use chrono::Utc;
use hoist_build::{BuildError, BuildOptions, BuildOutput};
use hoist_cloud::{ChartEngine, Cluster, CommandExecutor, DockerEngine, RegistryApi};
use hoist_core::Reporter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::deploy::{self, DeployOptions, DeployOutput};
use crate::down::{self, DownOptions};
use crate::error::{DeployError, DownError, PipelineError, PublishError};
use crate::publish::{self, PublishOptions, PublishOutput};

pub async fn build<D, E>(
    docker: &D,
    shell: &E,
    options: &BuildOptions,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<BuildOutput, BuildError>
where
    D: DockerEngine,
    E: CommandExecutor,
{
    let plan = hoist_build::plan::compile(options, Utc::now())?;
    plan.validate()?;
    hoist_build::execute::run(&plan, docker, shell, reporter, cancel).await
}

pub async fn publish<D, R>(
    docker: &D,
    registry: &R,
    options: &PublishOptions,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<PublishOutput, PublishError>
where
    D: DockerEngine,
    R: RegistryApi,
{
    let plan = publish::compile(registry, options, Utc::now()).await?;
    plan.validate()?;
    publish::run(&plan, docker, registry, reporter, cancel).await
}

pub async fn deploy<H, C>(
    helm: &H,
    cluster: &C,
    options: &DeployOptions,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<DeployOutput, DeployError>
where
    H: ChartEngine,
    C: Cluster,
{
    let plan = deploy::compile(helm, cluster, options, reporter, Utc::now()).await?;
    plan.validate()?;
    deploy::run(&plan, helm, cluster, reporter, cancel).await
}

pub async fn down<H, C>(
    helm: &H,
    cluster: &C,
    options: &DownOptions,
    reporter: &dyn Reporter,
) -> Result<(), DownError>
where
    H: ChartEngine,
    C: Cluster,
{
    let plan = down::compile(helm, options, reporter).await?;
    down::run(&plan, helm, cluster, reporter).await
}

/// Options of a full `up`. The publish images and the deploy image are
/// filled in from the previous stage.
#[derive(Debug, Clone)]
pub struct UpOptions {
    pub build: BuildOptions,
    /// `None` skips publishing; the deploy then runs the local image
    pub publish: Option<PublishOptions>,
    pub deploy: DeployOptions,
}

#[derive(Debug, Clone)]
pub struct UpOutput {
    pub build: BuildOutput,
    pub publish: Option<PublishOutput>,
    pub deploy: DeployOutput,
    pub duration: Duration,
}

/// Runs Build → Publish → Deploy against one set of collaborators.
pub struct Orchestrator<D, E, R, H, C> {
    pub docker: D,
    pub shell: E,
    pub registry: R,
    pub helm: H,
    pub cluster: C,
}

impl<D, E, R, H, C> Orchestrator<D, E, R, H, C>
where
    D: DockerEngine,
    E: CommandExecutor,
    R: RegistryApi,
    H: ChartEngine,
    C: Cluster,
{
    pub fn new(docker: D, shell: E, registry: R, helm: H, cluster: C) -> Self {
        Self {
            docker,
            shell,
            registry,
            helm,
            cluster,
        }
    }

    pub async fn up(
        &self,
        options: &UpOptions,
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<UpOutput, PipelineError> {
        let start = Instant::now();

        let built = build(&self.docker, &self.shell, &options.build, reporter, cancel).await?;
        let local_image = built.image.as_ref().map(ToString::to_string);

        let published = match (&options.publish, &built.image) {
            (Some(publish_options), Some(image)) => {
                let mut publish_options = publish_options.clone();
                publish_options.images = vec![image.clone()];
                Some(
                    publish(
                        &self.docker,
                        &self.registry,
                        &publish_options,
                        reporter,
                        cancel,
                    )
                    .await?,
                )
            }
            _ => None,
        };

        let mut deploy_options = options.deploy.clone();
        let remote_image = published.as_ref().zip(local_image.as_ref()).and_then(
            |(published, local)| published.published_images.get(local).cloned(),
        );
        if let Some(image) = remote_image.or(local_image) {
            deploy_options.image = Some(image);
        }
        let deployed = deploy(
            &self.helm,
            &self.cluster,
            &deploy_options,
            reporter,
            cancel,
        )
        .await?;

        Ok(UpOutput {
            build: built,
            publish: published,
            deploy: deployed,
            duration: start.elapsed(),
        })
    }
}
