use hoist_core::{ConsoleReporter, LocalImage};
use hoist_deploy::pipeline;
use tokio_util::sync::CancellationToken;

use super::Project;

/// Push local images to the project's image repository.
pub async fn publish(
    project: &Project,
    images: &[String],
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let images = images.iter().map(|i| LocalImage::parse(i)).collect();
    let options = project.publish_options(images)?;

    let output = pipeline::publish(
        &project.docker(),
        &project.registry(),
        &options,
        &ConsoleReporter,
        cancel,
    )
    .await?;

    println!();
    println!(
        "Published to {} ({} registry):",
        output.registry_host, output.registry_kind
    );
    for (local, remote) in &output.published_images {
        println!("  {local} -> {remote}");
    }
    Ok(())
}
