use hoist_core::ConsoleReporter;
use hoist_deploy::{DeployOutput, pipeline};
use tokio_util::sync::CancellationToken;

use super::Project;
use crate::DeployArgs;

/// Install or upgrade the app, and the runtime when it is out of date.
pub async fn deploy(
    project: &Project,
    image: Option<String>,
    args: &DeployArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let options = project.deploy_options(image, args)?;
    let cluster = project.cluster().await?;

    let output = pipeline::deploy(
        &project.helm(),
        &cluster,
        &options,
        &ConsoleReporter,
        cancel,
    )
    .await?;

    print_summary(&output);
    Ok(())
}

pub(super) fn print_summary(output: &DeployOutput) {
    println!();
    println!(
        "Deployed {} to namespace {} in {:.1}s",
        output.instance_name,
        output.namespace,
        output.duration.as_secs_f64()
    );
    for (chart, release) in &output.releases {
        println!("  {chart}: {} revision {}", release.name, release.revision);
    }
}
