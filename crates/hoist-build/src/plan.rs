use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hoist_cloud::RegistryCredentials;
use hoist_core::{
    Environment, LocalImage, RetryPolicy, UserError, deterministic_slug, generate_tag,
    to_valid_name,
};
use serde::Deserialize;

use crate::error::BuildError;

/// Label put on every image built for a project, used to find stale images.
pub const PROJECT_ID_LABEL: &str = "hoist.dev/project-id";

const DOCKERFILE: &str = "Dockerfile";

/// A service's build definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceBuild {
    /// Preset image; the service needs no Dockerfile build
    pub image: Option<String>,
    /// Shell command run before the image build
    pub build_command: Option<String>,
    /// Working directory of `build_command`, relative to the project dir
    pub path: Option<PathBuf>,
}

/// Registry used as a BuildKit inline cache.
#[derive(Debug, Clone)]
pub struct RemoteCache {
    /// Repository without tag; `<repository>:latest` is the cache source
    pub repository: String,
    pub credentials: Option<RegistryCredentials>,
}

#[derive(Deserialize)]
struct EncodedCredentials {
    username: String,
    password: String,
}

impl RemoteCache {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            credentials: None,
        }
    }

    pub fn cache_image(&self) -> String {
        format!("{}:latest", self.repository)
    }

    pub fn host(&self) -> &str {
        hoist_cloud::registry::registry_host(&self.repository)
    }
}

/// Decode base64-encoded `{"username", "password"}` JSON registry credentials.
pub fn decode_credentials(encoded: &str) -> Result<RegistryCredentials, BuildError> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BuildError::CacheCredentials {
            reason: e.to_string(),
        })?;
    let creds: EncodedCredentials =
        serde_json::from_slice(&raw).map_err(|e| BuildError::CacheCredentials {
            reason: e.to_string(),
        })?;
    Ok(RegistryCredentials::new(creds.username, creds.password))
}

/// Everything the user asked for in a build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// App name or path; only the base name is used for the image
    pub app_name: String,
    pub project_dir: PathBuf,
    /// Identity label value; derived from the app name and project dir when empty
    pub project_id: String,
    pub environment: Environment,
    /// `name[:tag]` of an image built outside hoist
    pub local_image: Option<String>,
    pub services: BTreeMap<String, ServiceBuild>,
    pub platform: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub remote_cache: Option<RemoteCache>,
    pub forward_ssh_agent: bool,
    pub session_retry_max_elapsed: Duration,
}

impl BuildOptions {
    pub fn new(app_name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.into(),
            project_dir: project_dir.into(),
            project_id: String::new(),
            environment: Environment::default(),
            local_image: None,
            services: BTreeMap::new(),
            platform: None,
            build_args: BTreeMap::new(),
            remote_cache: None,
            forward_ssh_agent: false,
            session_retry_max_elapsed: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceStep {
    pub service: String,
    pub command: String,
    pub working_dir: PathBuf,
}

/// A compiled build. Immutable once created.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub use_dockerfile: bool,
    /// Set when a Dockerfile build is needed and one was found
    pub dockerfile: Option<PathBuf>,
    pub project_dir: PathBuf,
    /// Image produced (or reused) by this build; `None` when every service
    /// brings its own image and no override was given
    pub image: Option<LocalImage>,
    pub labels: BTreeMap<String, String>,
    /// Service build commands, in service name order
    pub service_steps: Vec<ServiceStep>,
    pub platform: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub remote_cache: Option<RemoteCache>,
    pub forward_ssh_agent: bool,
    pub session_retry: RetryPolicy,
}

/// True when the project's own image has to be built from a Dockerfile.
pub fn needs_dockerfile(
    services: &BTreeMap<String, ServiceBuild>,
    local_image: Option<&str>,
) -> bool {
    services.is_empty()
        || (local_image.is_none() && services.values().any(|s| s.image.is_none()))
}

/// Compile `options` into a plan, generating the image tag from `now`.
pub fn compile(options: &BuildOptions, now: DateTime<Utc>) -> Result<BuildPlan, BuildError> {
    let use_dockerfile = needs_dockerfile(&options.services, options.local_image.as_deref());

    let (dockerfile, image) = if use_dockerfile {
        let candidate = options.project_dir.join(DOCKERFILE);
        let dockerfile = candidate.is_file().then_some(candidate);
        let name = to_valid_name(base_name(&options.app_name))
            .map_err(|e| BuildError::AppName { source: e })?;
        let tag = generate_tag(&options.environment.tag_prefix(), now);
        (dockerfile, Some(LocalImage::new(name, tag)))
    } else {
        (None, options.local_image.as_deref().map(LocalImage::parse))
    };

    let labels = BTreeMap::from([(PROJECT_ID_LABEL.to_owned(), project_id(options)?)]);

    let service_steps = options
        .services
        .iter()
        .filter_map(|(name, service)| {
            let command = service.build_command.as_ref()?;
            let working_dir = match &service.path {
                Some(path) => options.project_dir.join(path),
                None => options.project_dir.clone(),
            };
            Some(ServiceStep {
                service: name.clone(),
                command: command.clone(),
                working_dir,
            })
        })
        .collect();

    let plan = BuildPlan {
        use_dockerfile,
        dockerfile,
        project_dir: options.project_dir.clone(),
        image,
        labels,
        service_steps,
        platform: options.platform.clone(),
        build_args: options.build_args.clone(),
        remote_cache: options.remote_cache.clone(),
        forward_ssh_agent: options.forward_ssh_agent,
        session_retry: RetryPolicy::ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_elapsed: options.session_retry_max_elapsed,
        },
    };
    tracing::debug!(
        use_dockerfile = plan.use_dockerfile,
        image = ?plan.image,
        steps = plan.service_steps.len(),
        "compiled build plan"
    );
    Ok(plan)
}

impl BuildPlan {
    /// Check the plan against the filesystem before running anything.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !self.project_dir.is_dir() {
            return Err(BuildError::ProjectDir {
                path: self.project_dir.clone(),
            });
        }
        if self.use_dockerfile && self.dockerfile.is_none() {
            return Err(BuildError::DockerfileMissing {
                dir: self.project_dir.clone(),
                source: UserError::new(format!(
                    "Dockerfile missing.\n\
                     - Please add a Dockerfile manually under your app directory ({}).\n\
                     - Or set an image for every service in hoist.toml.",
                    self.project_dir.display()
                )),
            });
        }
        Ok(())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.labels.get(PROJECT_ID_LABEL).map(String::as_str)
    }
}

/// The configured project id, or `<app>-<slug of the canonical project dir>`.
pub fn project_id(options: &BuildOptions) -> Result<String, BuildError> {
    if !options.project_id.is_empty() {
        return Ok(options.project_id.clone());
    }
    let name = to_valid_name(base_name(&options.app_name))
        .map_err(|e| BuildError::AppName { source: e })?;
    // A missing dir still hashes to a stable id; the build fails on it later.
    let dir = match std::fs::canonicalize(&options.project_dir) {
        Ok(dir) => dir,
        Err(_) => options.project_dir.clone(),
    };
    let slug = deterministic_slug(&dir.to_string_lossy());
    Ok(format!("{name}-{slug}"))
}

fn base_name(app_name: &str) -> &str {
    Path::new(app_name)
        .file_name()
        .and_then(|n| n.to_str())
        // arch-lint: allow(no-silent-result-drop) reason="a name without a file component is used as given"
        .unwrap_or(app_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_of_path() {
        assert_eq!(base_name("/work/My_App"), "My_App");
        assert_eq!(base_name("app"), "app");
    }

    #[test]
    fn dockerfile_rule() {
        let preset = ServiceBuild {
            image: Some("redis:7".to_owned()),
            ..ServiceBuild::default()
        };
        let custom = ServiceBuild::default();

        assert!(needs_dockerfile(&BTreeMap::new(), None));
        assert!(needs_dockerfile(&BTreeMap::new(), Some("app:1")));

        let all_preset = BTreeMap::from([("cache".to_owned(), preset.clone())]);
        assert!(!needs_dockerfile(&all_preset, None));

        let mixed = BTreeMap::from([
            ("cache".to_owned(), preset),
            ("web".to_owned(), custom),
        ]);
        assert!(needs_dockerfile(&mixed, None));
        assert!(!needs_dockerfile(&mixed, Some("web:dev")));
    }
}
