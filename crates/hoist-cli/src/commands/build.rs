use hoist_core::ConsoleReporter;
use hoist_deploy::pipeline;
use tokio_util::sync::CancellationToken;

use super::Project;
use crate::BuildArgs;

/// Build the app image for the project.
pub async fn build(
    project: &Project,
    args: &BuildArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let options = project.build_options(args);
    let reporter = ConsoleReporter;
    let shell = hoist_cloud::RealExecutor;

    let output = pipeline::build(&project.docker(), &shell, &options, &reporter, cancel).await?;

    println!();
    match &output.image {
        Some(image) => println!("Built {image} in {:.1}s", output.duration.as_secs_f64()),
        None => println!("All services use preset images, nothing to build."),
    }
    Ok(())
}
