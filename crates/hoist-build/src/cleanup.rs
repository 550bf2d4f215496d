use hoist_cloud::{DockerEngine, DockerError};

/// Remove every local image labelled `key=value` except the most recently
/// created one. Returns how many images were removed.
pub async fn remove_stale_images<D: DockerEngine>(
    docker: &D,
    key: &str,
    value: &str,
) -> Result<usize, DockerError> {
    let mut images = docker.list_images_by_label(key, value).await?;
    if images.len() < 2 {
        return Ok(0);
    }
    images.sort_by(|a, b| b.created.cmp(&a.created));

    let mut removed = 0;
    for image in images.iter().skip(1) {
        tracing::debug!(id = %image.id, created = %image.created, "removing stale image");
        docker.remove_image(&image.id).await?;
        removed += 1;
    }
    Ok(removed)
}
