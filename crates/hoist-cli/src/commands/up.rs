use hoist_core::ConsoleReporter;
use hoist_deploy::{Orchestrator, UpOptions};
use tokio_util::sync::CancellationToken;

use super::Project;
use super::deploy::print_summary;
use crate::{BuildArgs, DeployArgs};

/// Build, publish and deploy. Publishing is skipped when no image
/// repository is configured; the cluster then runs the local image.
pub async fn up(
    project: &Project,
    build: &BuildArgs,
    deploy: &DeployArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let options = UpOptions {
        build: project.build_options(build),
        publish: project.up_publish_options()?,
        deploy: project.deploy_options(None, deploy)?,
    };
    if options.publish.is_none() {
        tracing::debug!("no image repository configured, skipping publish");
    }

    let hoist = Orchestrator::new(
        project.docker(),
        hoist_cloud::RealExecutor,
        project.registry(),
        project.helm(),
        project.cluster().await?,
    );
    let output = hoist.up(&options, &ConsoleReporter, cancel).await?;

    if let Some(publish) = &output.publish {
        println!();
        for remote in publish.published_images.values() {
            println!("Published {remote}");
        }
    }
    print_summary(&output.deploy);
    println!("Total time {:.1}s", output.duration.as_secs_f64());
    Ok(())
}
