use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Naming ──
    #[error("cannot derive a valid name from {input:?}")]
    InvalidName { input: String },

    #[error("unknown environment {0:?}; expected dev, prod or staging")]
    UnknownEnvironment(String),

    // ── Values ──
    #[error("failed to read values file {path}")]
    ValuesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse values file {path}")]
    ValuesParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("values file {path} must contain a mapping at the top level")]
    ValuesNotMapping { path: PathBuf },

    #[error("invalid --set expression {expr:?}: expected key=value")]
    InvalidSetExpression { expr: String },

    #[error("invalid value path {path:?}: {reason}")]
    InvalidValuePath { path: String, reason: &'static str },
}
