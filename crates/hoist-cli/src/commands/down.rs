use hoist_core::ConsoleReporter;
use hoist_deploy::pipeline;

use super::Project;

/// Remove the app from the cluster.
pub async fn down(project: &Project) -> anyhow::Result<()> {
    let options = project.down_options();
    let cluster = project.cluster().await?;

    pipeline::down(&project.helm(), &cluster, &options, &ConsoleReporter).await?;

    println!();
    println!(
        "Removed {} from namespace {}",
        project.instance_name, options.namespace
    );
    Ok(())
}
