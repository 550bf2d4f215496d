//! Kubernetes-safe names and short deterministic slugs.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Longest label Kubernetes accepts for object names.
pub const NAME_MAX_LENGTH: usize = 63;

/// Length of slugs produced by [`deterministic_slug`].
pub const SLUG_LENGTH: usize = 5;

static BAD_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"^[^[:alnum:]]+"));
static BAD_SUFFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"[^[:alnum:]]+$"));
static APOSTROPHES: LazyLock<Regex> = LazyLock::new(|| compile(r"[']+"));
static BAD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"([[:alnum:]])[^[:alnum:]._-]+([[:alnum:]])"));
static REPEATED_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| compile(r"([._-])[._-]*"));
static BAD_CHARACTERS: LazyLock<Regex> = LazyLock::new(|| compile(r"[^[:alnum:]._-]+"));
static NON_ALPHA_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"^[^[:alpha:]]+"));
static VALID_NAME: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-z]([-a-z0-9]*[a-z0-9])?$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Reduce `s` to ASCII alphanumerics separated by single `-`, `_` or `.`.
fn to_identifier(s: &str) -> String {
    let s = BAD_PREFIX.replace_all(s, "");
    let s = BAD_SUFFIX.replace_all(&s, "");
    // "daniel's" becomes "daniels", not "daniel-s"
    let s = APOSTROPHES.replace_all(&s, "");
    let s = BAD_SEPARATOR.replace_all(&s, "$1-$2");
    let s = BAD_CHARACTERS.replace_all(&s, "");
    REPEATED_SEPARATOR.replace_all(&s, "$1").into_owned()
}

/// Convert `s` into an RFC 1035 label: lowercase alphanumerics and `-`,
/// starting with a letter, ending with an alphanumeric, at most 63 chars.
pub fn to_valid_name(input: &str) -> crate::Result<String> {
    if input.len() <= NAME_MAX_LENGTH && VALID_NAME.is_match(input) {
        return Ok(input.to_owned());
    }

    let s = to_identifier(input).to_lowercase().replace(['_', '.'], "-");
    let mut s = NON_ALPHA_PREFIX.replace_all(&s, "").into_owned();
    if s.len() > NAME_MAX_LENGTH {
        s.truncate(NAME_MAX_LENGTH);
        s = BAD_SUFFIX.replace_all(&s, "").into_owned();
    }

    if s.is_empty() {
        return Err(crate::Error::InvalidName {
            input: input.to_owned(),
        });
    }
    Ok(s)
}

/// Short lowercase hash of `s`, stable across runs and machines.
pub fn deterministic_slug(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    let mut slug = hex::encode(digest);
    slug.truncate(SLUG_LENGTH);
    slug
}
