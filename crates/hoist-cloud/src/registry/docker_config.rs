use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use super::{DOCKER_HUB_HOST, RegistryCredentials, RegistryError};

/// Key `docker login` uses for Docker Hub in `config.json`.
const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// The parts of `~/.docker/config.json` needed to find registry credentials.
#[derive(Debug, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
}

/// Where a registry's credentials live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Inline(String),
    Helper(String),
}

impl DockerConfig {
    /// Config directory from `DOCKER_CONFIG`, else `~/.docker`.
    pub fn default_dir() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
            return Some(PathBuf::from(dir));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker"))
    }

    /// Load `config.json` from `dir`; a missing file is an empty config.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let path = dir.join("config.json");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RegistryError::DockerConfig { path, source: e }),
        };
        serde_json::from_str(&content).map_err(|e| RegistryError::Parse {
            what: "docker config.json",
            source: e,
        })
    }

    /// Per-registry helpers win over inline auths, which win over the global store.
    pub fn source_for(&self, host: &str) -> Option<CredentialSource> {
        let keys = lookup_keys(host);
        if let Some(helper) = keys.iter().find_map(|k| self.cred_helpers.get(k)) {
            return Some(CredentialSource::Helper(helper.clone()));
        }
        if let Some(auth) = keys
            .iter()
            .find_map(|k| self.auths.get(k).and_then(|e| e.auth.clone()))
        {
            return Some(CredentialSource::Inline(auth));
        }
        self.creds_store.clone().map(CredentialSource::Helper)
    }
}

/// Decode an inline `auth` value, base64 of `user:password`.
pub(super) fn decode_inline(auth: &str) -> Option<RegistryCredentials> {
    // arch-lint: allow(no-silent-result-drop) reason="a malformed inline auth entry is treated as absent so the credential helper is tried"
    let bytes = STANDARD.decode(auth.trim()).ok()?;
    // arch-lint: allow(no-silent-result-drop) reason="non-UTF-8 credentials are treated as absent"
    let text = String::from_utf8(bytes).ok()?;
    let (user, password) = text.split_once(':')?;
    Some(RegistryCredentials::new(user, password))
}

/// Keys a host may be stored under.
pub(super) fn lookup_keys(host: &str) -> Vec<String> {
    if host == DOCKER_HUB_HOST || host == "index.docker.io" {
        return vec![
            DOCKER_HUB_AUTH_KEY.to_owned(),
            "index.docker.io".to_owned(),
            DOCKER_HUB_HOST.to_owned(),
        ];
    }
    vec![host.to_owned(), format!("https://{host}")]
}

/// Output of `docker-credential-<helper> get`.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct HelperOutput {
    pub username: String,
    pub secret: String,
}
