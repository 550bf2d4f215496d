//! Push locally built images to the project's registry.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hoist_cloud::registry::{self, validate_gcp_image_name};
use hoist_cloud::{DockerEngine, ImageRegistry, RegistryApi, RegistryCredentials, RegistryKind};
use hoist_core::{
    Environment, LocalImage, Reporter, RetryError, RetryPolicy, UserError, deterministic_slug,
    generate_tag, retry,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PublishError;

const EXPECTED_ARCHITECTURE: &str = "amd64";

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub images: Vec<LocalImage>,
    pub environment: Environment,
    /// Registry location with repository, e.g. `ghcr.io/acme/app`
    pub repository: String,
    /// Credentials of a registry managed for the project
    pub project_credentials: Option<RegistryCredentials>,
    pub push_attempts: u32,
    pub push_retry_delay: Duration,
}

impl PublishOptions {
    pub fn new(repository: impl Into<String>, images: Vec<LocalImage>) -> Self {
        Self {
            images,
            environment: Environment::default(),
            repository: repository.into(),
            project_credentials: None,
            push_attempts: 3,
            push_retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub local: LocalImage,
    /// Full remote reference with the generated tag
    pub remote: String,
    /// Same repository, `latest` tag
    pub remote_latest: String,
}

#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub registry: ImageRegistry,
    pub targets: Vec<PublishTarget>,
    pub push_policy: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct PublishOutput {
    /// Local `name[:tag]` to the remote reference it was pushed as
    pub published_images: BTreeMap<String, String>,
    pub registry_host: String,
    pub registry_kind: RegistryKind,
    pub duration: Duration,
}

/// Remote tag for `image`: environment prefix, a slug of the full local
/// reference, then the timestamp.
pub fn remote_tag(environment: Environment, image: &LocalImage, now: DateTime<Utc>) -> String {
    let prefix = format!(
        "{}{}-",
        environment.tag_prefix(),
        deterministic_slug(&image.to_string())
    );
    generate_tag(&prefix, now)
}

/// Resolve the registry once and derive a remote reference for every image.
pub async fn compile<R: RegistryApi>(
    api: &R,
    options: &PublishOptions,
    now: DateTime<Utc>,
) -> Result<PublishPlan, PublishError> {
    let registry = registry::resolve(
        api,
        &options.repository,
        options.project_credentials.clone(),
    )
    .await
    .map_err(|e| PublishError::Registry {
        location: options.repository.clone(),
        source: e,
    })?;

    let targets = options
        .images
        .iter()
        .map(|image| PublishTarget {
            local: image.clone(),
            remote: registry.remote_image(&remote_tag(options.environment, image, now)),
            remote_latest: registry.remote_image("latest"),
        })
        .collect();

    tracing::debug!(kind = %registry.kind, repository = %registry.repository, "compiled publish plan");
    Ok(PublishPlan {
        registry,
        targets,
        push_policy: RetryPolicy::Fixed {
            attempts: options.push_attempts.max(1),
            delay: options.push_retry_delay,
        },
    })
}

impl PublishPlan {
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.registry.kind != RegistryKind::Gcp {
            return Ok(());
        }
        for target in &self.targets {
            validate_gcp_image_name(&target.remote).map_err(|e| {
                PublishError::InvalidImageName {
                    image: target.remote.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}

pub async fn run<D, R>(
    plan: &PublishPlan,
    docker: &D,
    api: &R,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<PublishOutput, PublishError>
where
    D: DockerEngine,
    R: RegistryApi,
{
    let start = Instant::now();
    let registry = &plan.registry;

    registry::ensure_repository(api, registry)
        .await
        .map_err(|e| PublishError::Repository {
            repository: registry.repository.clone(),
            source: e,
        })?;

    if let Some(credentials) = &registry.credentials {
        docker
            .login(&registry.host, credentials)
            .await
            .map_err(|e| PublishError::Login {
                host: registry.host.clone(),
                source: e,
            })?;
    }

    let mut published_images = BTreeMap::new();
    for target in &plan.targets {
        publish_image(plan, target, docker, reporter, cancel).await?;
        published_images.insert(target.local.to_string(), target.remote.clone());
    }

    Ok(PublishOutput {
        published_images,
        registry_host: registry.host.clone(),
        registry_kind: registry.kind,
        duration: start.elapsed(),
    })
}

async fn publish_image<D: DockerEngine>(
    plan: &PublishPlan,
    target: &PublishTarget,
    docker: &D,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<(), PublishError> {
    let local = target.local.to_string();

    match docker.inspect_image(&local).await {
        Ok(info) if info.architecture != EXPECTED_ARCHITECTURE => reporter.warn(&format!(
            "Image {local} is not an amd64 image ({}). It will still be published, but it \
             will likely not run. Please build your image for the amd64 architecture.",
            info.architecture
        )),
        Ok(_) => {}
        // arch-lint: allow(no-error-swallowing) reason="tagging below reports a missing image properly"
        Err(e) => tracing::debug!(error = %e, image = %local, "image inspect failed"),
    }

    reporter.detail(&format!("docker tag {local} {}", target.remote));
    docker
        .tag(&local, &target.remote)
        .await
        .map_err(|e| PublishError::Tag {
            image: local.clone(),
            source: e,
        })?;

    reporter.step(&format!("Pushing {}...", target.remote));
    let pushed = retry(
        &plan.push_policy,
        cancel,
        |_| true,
        |attempt| {
            if attempt > 1 {
                reporter.warn(&format!(
                    "Error pushing image. Trying again (attempt {attempt})."
                ));
            }
            docker.push(&target.remote)
        },
    )
    .await;
    match pushed {
        Ok(()) => {}
        Err(RetryError::Cancelled) => return Err(PublishError::Cancelled),
        Err(RetryError::Exhausted { source, .. } | RetryError::Fatal(source)) => {
            return Err(PublishError::Push {
                image: target.remote.clone(),
                source: UserError::with_cause(
                    "Failed to push to image registry. Please check your internet connection \
                     and try again.",
                    source,
                ),
            });
        }
    }

    let latest = async {
        docker.tag(&local, &target.remote_latest).await?;
        docker.push(&target.remote_latest).await
    };
    // arch-lint: allow(no-error-swallowing) reason="best effort: latest only serves as a build cache source"
    if let Err(e) = latest.await {
        tracing::debug!(error = %e, image = %target.remote_latest, "latest alias not pushed");
    }
    Ok(())
}
