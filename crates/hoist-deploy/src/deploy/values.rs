//! Computed chart values for the app and runtime charts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hoist_core::{Environment, LocalImage, UserError, Values};
use rand::Rng;
use serde_json::{Map, Value as JsonValue, json};

use crate::error::DeployError;

/// Key of the redis password in the runtime secret.
pub const REDIS_PASSWORD_KEY: &str = "redis-pass";
/// Key of the project API key in the runtime secret.
pub const API_KEY_SECRET_KEY: &str = "api-key-secret";

/// Values set from cluster secrets after the currency check.
pub const LATE_SECRET_PATHS: [&str; 2] = ["redis.password", "hoist.apiKeySecret"];

const REDIS_PASSWORD_LENGTH: usize = 10;
const PASSWORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Inputs of the app chart's computed defaults.
#[derive(Debug, Clone, Copy)]
pub struct AppDefaults<'a> {
    pub instance_name: &'a str,
    pub environment: Environment,
    pub image: Option<&'a str>,
    pub env_vars: &'a BTreeMap<String, String>,
    pub secret_files: &'a BTreeMap<String, String>,
}

/// Defaults computed for every app deploy, before user overrides.
pub fn app_defaults(defaults: &AppDefaults<'_>) -> Values {
    let secrets: Map<String, JsonValue> = defaults
        .env_vars
        .iter()
        .map(|(k, v)| (k.clone(), JsonValue::String(STANDARD.encode(v))))
        .collect();

    let mut values = Values::from_json(json!({
        "hoist": {
            "instanceName": defaults.instance_name,
            "environment": defaults.environment.as_str(),
        },
        "secrets": secrets,
        "secretsToMountAsFiles": defaults.secret_files,
        "jobs": {
            "ttlSecondsAfterFinished": defaults.environment.job_ttl_seconds(),
        },
    }));

    if let Some(image) = defaults.image {
        let image = LocalImage::parse(image);
        let mut image_values = json!({ "repository": image.name });
        if let Some(tag) = image.tag {
            image_values["tag"] = JsonValue::String(tag);
        }
        values.merge(&Values::from_json(json!({ "image": image_values })));
    }
    values
}

/// Runtime chart defaults: standalone redis reading its password from the
/// runtime secret, persistent only on local clusters.
pub fn runtime_defaults(secret_name: &str, is_local_cluster: bool) -> Values {
    Values::from_json(json!({
        "redis": {
            "architecture": "standalone",
            "auth": {
                "existingSecret": secret_name,
                "existingSecretPasswordKey": REDIS_PASSWORD_KEY,
                "usePasswordFiles": true,
            },
            "master": {
                "configuration": "notify-keyspace-events K$z",
                "persistence": {
                    "enabled": is_local_cluster,
                },
            },
        },
    }))
}

/// Add the secret-derived runtime values. The redis password is reused from
/// the secret when present, otherwise a new one is generated.
pub fn apply_runtime_secrets(
    values: &mut Values,
    secret: &BTreeMap<String, Vec<u8>>,
) -> Result<(), DeployError> {
    let password = match secret.get(REDIS_PASSWORD_KEY) {
        Some(existing) => existing.clone(),
        None => generate_password().into_bytes(),
    };
    values
        .set("redis.password", STANDARD.encode(password))
        .map_err(|e| DeployError::Values { source: e })?;

    if let Some(api_key) = secret.get(API_KEY_SECRET_KEY) {
        values
            .set("hoist.apiKeySecret", STANDARD.encode(api_key))
            .map_err(|e| DeployError::Values { source: e })?;
    }
    Ok(())
}

fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..REDIS_PASSWORD_LENGTH)
        .map(|_| PASSWORD_CHARS[rng.random_range(0..PASSWORD_CHARS.len())] as char)
        .collect()
}

/// Read secret files into `file name -> base64 content`.
pub fn load_secret_files(paths: &[PathBuf]) -> Result<BTreeMap<String, String>, DeployError> {
    let mut files = BTreeMap::new();
    let mut origins: BTreeMap<String, &Path> = BTreeMap::new();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            // arch-lint: allow(no-silent-result-drop) reason="paths ending in .. have no file name and are rejected by the read below"
            .unwrap_or_default();
        if let Some(first) = origins.get(&name) {
            return Err(DeployError::DuplicateSecretFile {
                first: first.to_path_buf(),
                second: path.clone(),
            });
        }

        let data = std::fs::read(path).map_err(|e| DeployError::SecretFile {
            path: path.clone(),
            source: UserError::with_cause(
                format!("Could not load file {}", path.display()),
                e,
            ),
        })?;
        origins.insert(name.clone(), path);
        files.insert(name, STANDARD.encode(data));
    }
    Ok(files)
}

/// Variables of a dotenv file, in file order with later keys winning.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>, DeployError> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| DeployError::EnvFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    iter.map(|item| {
        item.map_err(|e| DeployError::EnvFile {
            path: path.to_path_buf(),
            source: e,
        })
    })
    .collect()
}
