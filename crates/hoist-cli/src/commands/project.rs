use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::TimeDelta;
use hoist_build::{BuildOptions, RemoteCache, ServiceBuild, decode_credentials};
use hoist_cloud::{
    ChartRef, DockerCli, HelmCli, KubeCluster, RegistryClient, RegistryCredentials,
    current_context, is_local_context,
};
use hoist_core::{Environment, HoistConfig, LocalImage, Values, to_valid_name};
use hoist_deploy::{
    APP_CHART_NAME, DeployOptions, DownOptions, ExternalChart, PublishOptions, RUNTIME_RELEASE,
};

use crate::{BuildArgs, DeployArgs};

/// Base64 `{"username", "password"}` JSON for the project's own registry.
pub const REGISTRY_CREDENTIALS_ENV: &str = "HOIST_REGISTRY_CREDENTIALS";

/// A loaded hoist.toml plus the names derived from it.
pub struct Project {
    pub dir: PathBuf,
    pub config: HoistConfig,
    pub environment: Environment,
    pub app_name: String,
    /// Helm release of the app chart
    pub release_name: String,
    /// `app.kubernetes.io/instance` of everything the app creates
    pub instance_name: String,
    /// Credentials of a project-managed registry, used for publishing and
    /// for the remote build cache
    pub registry_credentials: Option<RegistryCredentials>,
}

impl Project {
    pub fn load(dir: &Path, environment: Option<Environment>) -> anyhow::Result<Self> {
        let config = HoistConfig::load(dir)
            .with_context(|| format!("failed to load hoist.toml from {}", dir.display()))?;
        let app_name = config.app_name(dir);
        let instance_name = to_valid_name(&app_name)?;
        // arch-lint: allow(no-silent-result-drop) reason="projects without an id are released under the app name"
        let release_name = to_valid_name(config.project.id.as_deref().unwrap_or(&app_name))?;
        tracing::debug!(%app_name, %release_name, %instance_name, "loaded project");

        let registry_credentials = match std::env::var(REGISTRY_CREDENTIALS_ENV) {
            Ok(encoded) => Some(
                decode_credentials(&encoded)
                    .with_context(|| format!("failed to decode {REGISTRY_CREDENTIALS_ENV}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            // arch-lint: allow(no-silent-result-drop) reason="--env overrides the configured environment"
            environment: environment.unwrap_or(config.project.environment),
            config,
            app_name,
            release_name,
            instance_name,
            registry_credentials,
        })
    }

    fn image_repository(&self) -> anyhow::Result<&str> {
        self.config.project.image_repository.as_deref().ok_or_else(|| {
            anyhow::anyhow!("image_repository not set in hoist.toml, set [project].image_repository")
        })
    }

    pub fn kube_context(&self) -> Option<String> {
        self.config.project.kube_context.clone().or_else(current_context)
    }

    // ── Options ──

    pub fn build_options(&self, args: &BuildArgs) -> BuildOptions {
        let build = &self.config.build;
        let mut options = BuildOptions::new(&self.app_name, &self.dir);
        // arch-lint: allow(no-silent-result-drop) reason="an empty id is derived from the app name and project dir"
        options.project_id = self.config.project.id.clone().unwrap_or_default();
        options.environment = self.environment;
        options.local_image = args.local_image.clone();
        options.services = self
            .config
            .services
            .iter()
            .map(|(name, service)| {
                let build = ServiceBuild {
                    image: service.image.clone(),
                    build_command: service.build_command.clone(),
                    path: service.path.clone(),
                };
                (name.clone(), build)
            })
            .collect();
        options.platform = args.platform.clone().or_else(|| build.platform.clone());
        options.build_args = build.args.clone();
        options.remote_cache = match &self.config.project.image_repository {
            Some(repository) if build.remote_cache => Some(RemoteCache {
                repository: repository.clone(),
                credentials: self.registry_credentials.clone(),
            }),
            _ => None,
        };
        options.forward_ssh_agent = std::env::var_os("SSH_AUTH_SOCK").is_some();
        options.session_retry_max_elapsed = build.session_retry_max_elapsed();
        options
    }

    pub fn publish_options(&self, images: Vec<LocalImage>) -> anyhow::Result<PublishOptions> {
        let mut options = PublishOptions::new(self.image_repository()?, images);
        options.environment = self.environment;
        options.project_credentials = self.registry_credentials.clone();
        options.push_attempts = self.config.publish.push_attempts;
        options.push_retry_delay = self.config.publish.push_retry_delay();
        Ok(options)
    }

    /// Publish options when a repository is configured, otherwise `None`.
    pub fn up_publish_options(&self) -> anyhow::Result<Option<PublishOptions>> {
        if self.config.project.image_repository.is_none() {
            return Ok(None);
        }
        self.publish_options(Vec::new()).map(Some)
    }

    pub fn deploy_options(
        &self,
        image: Option<String>,
        args: &DeployArgs,
    ) -> anyhow::Result<DeployOptions> {
        let deploy = &self.config.deploy;
        let mut options = DeployOptions::new(
            &self.instance_name,
            &self.release_name,
            self.config.namespace(),
        );
        options.environment = self.environment;
        options.image = image;
        options.app_chart = ChartRef {
            name: APP_CHART_NAME.to_owned(),
            repo_url: Some(deploy.chart_repo_url.clone()),
            version: Some(deploy.app_chart_version.clone()),
            path: deploy.app_chart_path.as_ref().map(|p| self.dir.join(p)),
        };
        options.runtime_chart = deploy.install_runtime.then(|| ChartRef {
            name: RUNTIME_RELEASE.to_owned(),
            repo_url: Some(deploy.chart_repo_url.clone()),
            version: Some(deploy.runtime_chart_version.clone()),
            path: None,
        });
        options.external_charts = self.external_charts()?;

        options.value_files = self.project_paths(&deploy.value_files);
        options.value_files.extend(args.value_files.iter().cloned());
        options.set_values = args.set_values.clone();
        options.env_vars = parse_env_vars(&args.secret_env)?;
        options.env_file = args
            .env_file
            .clone()
            .or_else(|| deploy.env_file.as_ref().map(|p| self.dir.join(p)));
        options.secret_files = self.project_paths(&deploy.secret_files);
        options.secret_files.extend(args.secret_files.iter().cloned());

        options.is_local_cluster = self.kube_context().is_some_and(|c| is_local_context(&c));
        options.reinstall_on_error = args.reinstall_on_error;
        options.timeout = deploy.helm_timeout();
        options.watch_timeout = deploy.watch_timeout();
        options.release_freshness = TimeDelta::hours(deploy.release_freshness_hours);
        Ok(options)
    }

    pub fn down_options(&self) -> DownOptions {
        DownOptions {
            release_name: self.release_name.clone(),
            instance_name: self.instance_name.clone(),
            namespace: self.config.namespace().to_owned(),
            external_releases: self
                .config
                .deploy
                .external_charts
                .iter()
                .map(|c| c.release.clone())
                .collect(),
        }
    }

    fn external_charts(&self) -> anyhow::Result<Vec<ExternalChart>> {
        self.config
            .deploy
            .external_charts
            .iter()
            .map(|ext| {
                let mut values = Values::new();
                for path in self.project_paths(&ext.value_files) {
                    let file = Values::from_yaml_file(&path)?;
                    values.merge(&file);
                }
                let local = self.dir.join(&ext.chart);
                let chart = ChartRef {
                    name: ext.chart.clone(),
                    repo_url: ext.repo_url.clone(),
                    version: ext.version.clone(),
                    path: local.is_dir().then_some(local),
                };
                Ok(ExternalChart {
                    chart,
                    release: ext.release.clone(),
                    values,
                })
            })
            .collect()
    }

    fn project_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.dir.join(p)).collect()
    }

    // ── Collaborators ──

    pub fn docker(&self) -> DockerCli {
        DockerCli::new()
    }

    pub fn registry(&self) -> RegistryClient {
        RegistryClient::new()
    }

    pub fn helm(&self) -> HelmCli {
        HelmCli::new()
            .kube_context(self.config.project.kube_context.clone())
            .history_max(self.config.deploy.history_max)
    }

    pub async fn cluster(&self) -> anyhow::Result<KubeCluster> {
        let cluster = KubeCluster::connect(self.config.project.kube_context.as_deref())
            .await
            .context("failed to connect to the Kubernetes cluster")?;
        Ok(cluster)
    }
}

/// Parse `KEY=VALUE` pairs given on the command line.
fn parse_env_vars(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => anyhow::bail!("invalid secret env {pair:?}, expected KEY=VALUE"),
        })
        .collect()
}
