use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use hoist_core::UserError;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::command::{CommandError, CommandSpec};
use crate::executor::{CommandExecutor, RealExecutor};
use crate::registry::RegistryCredentials;

/// Container build and push operations.
#[allow(async_fn_in_trait)]
pub trait DockerEngine: Send + Sync {
    /// Server version; fails with a user-facing error if the daemon is unreachable.
    async fn version(&self) -> Result<String, DockerError>;

    async fn build(&self, request: &BuildRequest) -> Result<(), DockerError>;

    async fn tag(&self, source: &str, target: &str) -> Result<(), DockerError>;

    async fn push(&self, image: &str) -> Result<(), DockerError>;

    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
    ) -> Result<(), DockerError>;

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, DockerError>;

    async fn list_images_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ImageInfo>, DockerError>;

    async fn remove_image(&self, id: &str) -> Result<(), DockerError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub tags: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub platform: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub cache_from: Vec<String>,
    /// Forward the local SSH agent (`--ssh default`)
    pub forward_ssh_agent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInfo {
    pub id: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    config: ImageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct ImageConfig {
    #[serde(default, rename = "Labels")]
    labels: Option<BTreeMap<String, String>>,
}

impl ImageInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker daemon is not available")]
    Unavailable { source: UserError },

    #[error("image {image} does not exist locally")]
    ImageNotFound { image: String, source: UserError },

    #[error("docker {action} failed")]
    Command {
        action: &'static str,
        source: CommandError,
    },

    #[error("failed to parse docker {action} output")]
    Parse {
        action: &'static str,
        source: serde_json::Error,
    },
}

impl DockerError {
    /// BuildKit lost its session with the daemon; the build can be retried.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Command { source, .. } if source.stderr_contains("no active session"))
    }
}

/// Drives the `docker` CLI.
pub struct DockerCli<E: CommandExecutor = RealExecutor> {
    executor: E,
}

impl DockerCli<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerCli<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> DockerCli<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    async fn run(&self, action: &'static str, cmd: CommandSpec) -> Result<String, DockerError> {
        self.executor
            .exec(&cmd)
            .await
            .map_err(|e| DockerError::Command { action, source: e })
    }

    async fn inspect_many(&self, refs: &[String]) -> Result<Vec<ImageInfo>, DockerError> {
        let cmd = docker(["image", "inspect"]).extend_args(refs.iter().cloned());
        let out = self.run("image inspect", cmd).await?;
        serde_json::from_str(&out).map_err(|e| DockerError::Parse {
            action: "image inspect",
            source: e,
        })
    }
}

impl<E: CommandExecutor> DockerEngine for DockerCli<E> {
    async fn version(&self) -> Result<String, DockerError> {
        match self
            .executor
            .exec(&docker(["version", "--format", "{{.Server.Version}}"]))
            .await
        {
            Ok(v) => Ok(v.trim().to_owned()),
            Err(e) => Err(DockerError::Unavailable {
                source: UserError::with_cause(
                    "Docker not installed or not running. Please install Docker and make sure \
                     the daemon is running: https://docs.docker.com/get-docker/",
                    e,
                ),
            }),
        }
    }

    async fn build(&self, request: &BuildRequest) -> Result<(), DockerError> {
        let mut cmd = docker(["build"]);
        for tag in &request.tags {
            cmd = cmd.arg("--tag").arg(tag);
        }
        for (key, value) in &request.labels {
            cmd = cmd.arg("--label").arg(format!("{key}={value}"));
        }
        if let Some(platform) = &request.platform {
            cmd = cmd.arg("--platform").arg(platform);
        }
        for (key, value) in &request.build_args {
            cmd = cmd.arg("--build-arg").arg(format!("{key}={value}"));
        }
        for cache in &request.cache_from {
            cmd = cmd.arg("--cache-from").arg(cache);
        }
        if request.forward_ssh_agent {
            cmd = cmd.arg("--ssh").arg("default");
        }
        cmd = cmd
            .arg("--file")
            .arg(request.dockerfile.to_string_lossy())
            .arg(request.context_dir.to_string_lossy())
            .env("DOCKER_BUILDKIT", "1");

        let out = self.run("build", cmd).await?;
        tracing::debug!(output = %out, "docker build finished");
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), DockerError> {
        match self.executor.exec(&docker(["tag", source, target])).await {
            Ok(_) => Ok(()),
            Err(e) if e.stderr_contains("No such image") => Err(DockerError::ImageNotFound {
                image: source.to_owned(),
                source: UserError::with_cause(
                    format!(
                        "Image {source} not found. If you want to publish a remote image, \
                         please pull it first."
                    ),
                    e,
                ),
            }),
            Err(e) => Err(DockerError::Command {
                action: "tag",
                source: e,
            }),
        }
    }

    async fn push(&self, image: &str) -> Result<(), DockerError> {
        self.executor
            .exec_streaming(&docker(["push", image]))
            .await
            .map_err(|e| DockerError::Command {
                action: "push",
                source: e,
            })
    }

    async fn login(
        &self,
        registry_host: &str,
        credentials: &RegistryCredentials,
    ) -> Result<(), DockerError> {
        let cmd = docker([
            "login",
            "--username",
            credentials.username.as_str(),
            "--password-stdin",
            registry_host,
        ])
        .stdin(credentials.password.expose_secret().as_bytes());
        self.run("login", cmd).await.map(|_| ())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInfo, DockerError> {
        let mut infos = self.inspect_many(&[image.to_owned()]).await?;
        if infos.is_empty() {
            return Err(DockerError::ImageNotFound {
                image: image.to_owned(),
                source: UserError::new(format!("Image {image} not found.")),
            });
        }
        Ok(infos.swap_remove(0))
    }

    async fn list_images_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ImageInfo>, DockerError> {
        let filter = format!("label={key}={value}");
        let out = self
            .run(
                "image ls",
                docker(["image", "ls", "--quiet", "--no-trunc", "--filter", &filter]),
            )
            .await?;

        let mut ids: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.inspect_many(&ids).await
    }

    async fn remove_image(&self, id: &str) -> Result<(), DockerError> {
        self.run("rmi", docker(["rmi", "--force", id]))
            .await
            .map(|_| ())
    }
}

fn docker<'a>(args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
    CommandSpec::new("docker", args)
}
