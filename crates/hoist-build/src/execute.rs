use std::time::Duration;

use hoist_cloud::{BuildRequest, CommandExecutor, CommandSpec, DockerEngine, DockerError};
use hoist_core::{LocalImage, Reporter, RetryError, retry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cleanup;
use crate::error::BuildError;
use crate::plan::{BuildPlan, PROJECT_ID_LABEL};

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub image: Option<LocalImage>,
    pub duration: Duration,
}

/// Run a validated plan: service build commands, then the Dockerfile build,
/// then removal of older images of the same project.
pub async fn run<D, E>(
    plan: &BuildPlan,
    docker: &D,
    shell: &E,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<BuildOutput, BuildError>
where
    D: DockerEngine,
    E: CommandExecutor,
{
    let start = Instant::now();

    for step in &plan.service_steps {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        reporter.step(&format!("Building service {}...", step.service));
        let cmd = CommandSpec::shell(&step.command).current_dir(&step.working_dir);
        shell
            .exec_streaming(&cmd)
            .await
            .map_err(|e| BuildError::ServiceBuild {
                service: step.service.clone(),
                source: e,
            })?;
    }

    if plan.use_dockerfile {
        build_image(plan, docker, reporter, cancel).await?;

        if let Some(project_id) = plan.project_id() {
            match cleanup::remove_stale_images(docker, PROJECT_ID_LABEL, project_id).await {
                Ok(0) => {}
                Ok(removed) => reporter.detail(&format!("Removed {removed} old image(s)")),
                Err(e) => {
                    tracing::warn!(error = %e, "image cleanup failed");
                    reporter.warn("Could not remove old images built for this project.");
                }
            }
        }
    }

    let output = BuildOutput {
        image: plan.image.clone(),
        duration: start.elapsed(),
    };
    tracing::debug!(
        image = ?output.image,
        duration_ms = output.duration.as_millis() as u64,
        "build finished"
    );
    Ok(output)
}

async fn build_image<D: DockerEngine>(
    plan: &BuildPlan,
    docker: &D,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<(), BuildError> {
    let version = docker
        .version()
        .await
        .map_err(|e| BuildError::DockerUnavailable { source: e })?;
    tracing::debug!(%version, "docker available");

    let request = build_request(plan);

    if let Some((cache, credentials)) = plan
        .remote_cache
        .as_ref()
        .and_then(|cache| cache.credentials.as_ref().map(|creds| (cache, creds)))
    {
        docker
            .login(cache.host(), credentials)
            .await
            .map_err(|e| BuildError::CacheLogin {
                host: cache.host().to_owned(),
                source: e,
            })?;
    }

    if let Some(image) = &plan.image {
        reporter.step(&format!("Building image {image}..."));
    }

    let result = retry(
        &plan.session_retry,
        cancel,
        DockerError::is_session_lost,
        |attempt| {
            if attempt > 1 {
                reporter.detail(&format!(
                    "Build lost its session with the docker daemon, retrying (attempt {attempt})"
                ));
            }
            docker.build(&request)
        },
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(RetryError::Fatal(e)) => Err(BuildError::Docker { source: e }),
        Err(RetryError::Exhausted { attempts, source }) => {
            Err(BuildError::SessionRetriesExhausted { attempts, source })
        }
        Err(RetryError::Cancelled) => Err(BuildError::Cancelled),
    }
}

/// Translate the plan into the engine's build request.
pub fn build_request(plan: &BuildPlan) -> BuildRequest {
    let mut build_args = plan.build_args.clone();
    let mut cache_from = Vec::new();
    if let Some(cache) = &plan.remote_cache {
        build_args.insert("BUILDKIT_INLINE_CACHE".to_owned(), "1".to_owned());
        cache_from.push(cache.cache_image());
    }

    BuildRequest {
        context_dir: plan.project_dir.clone(),
        dockerfile: match &plan.dockerfile {
            Some(path) => path.clone(),
            None => plan.project_dir.join("Dockerfile"),
        },
        tags: plan.image.iter().map(ToString::to_string).collect(),
        labels: plan.labels.clone(),
        platform: plan.platform.clone(),
        build_args,
        cache_from,
        forward_ssh_agent: plan.forward_ssh_agent,
    }
}
