use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment an invocation targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
    Staging,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Staging => "staging",
        }
    }

    /// Prefix prepended to generated image tags, e.g. `dev-`.
    pub fn tag_prefix(self) -> String {
        format!("{}-", self.as_str())
    }

    /// Seconds finished jobs are kept before the cluster garbage-collects them.
    pub fn job_ttl_seconds(self) -> u64 {
        match self {
            Self::Dev => 600,
            Self::Prod | Self::Staging => 86_400,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            "staging" => Ok(Self::Staging),
            _ => Err(crate::Error::UnknownEnvironment(s.to_owned())),
        }
    }
}
