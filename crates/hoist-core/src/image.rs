use std::fmt;

use chrono::{DateTime, Utc};

/// Tag timestamp layout: UTC to the millisecond, 17 ASCII digits.
const TAG_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// A locally built image reference, `name[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalImage {
    pub name: String,
    pub tag: Option<String>,
}

impl LocalImage {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: Some(tag.into()),
        }
    }

    /// Split `name[:tag]`. A colon that belongs to a registry port
    /// (`localhost:5000/app`) is not treated as a tag separator.
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') && !name.is_empty() => Self {
                name: name.to_owned(),
                tag: Some(tag.to_owned()),
            },
            _ => Self {
                name: reference.to_owned(),
                tag: None,
            },
        }
    }

    pub fn tag_or_latest(&self) -> &str {
        // arch-lint: allow(no-silent-result-drop) reason="an untagged image reference means latest"
        self.tag.as_deref().unwrap_or("latest")
    }
}

impl fmt::Display for LocalImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{tag}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Build a tag from `now`, e.g. `dev-20240131235959123`.
///
/// Two calls within the same millisecond produce the same tag.
pub fn generate_tag(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}{}", now.format(TAG_TIMESTAMP_FORMAT))
}
