//! Decide whether an installed release already matches what would be deployed.

use chrono::{DateTime, TimeDelta, Utc};
use hoist_cloud::Release;
use hoist_core::Values;

/// What the chart engine reports for an installed release.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRelease {
    pub release: Release,
    /// User-supplied values of the latest revision
    pub values: Values,
}

#[derive(Debug, Clone)]
pub struct CurrencyChecker {
    ignored_paths: Vec<String>,
    max_age: TimeDelta,
}

impl CurrencyChecker {
    pub fn new(max_age: TimeDelta) -> Self {
        Self {
            ignored_paths: Vec::new(),
            max_age,
        }
    }

    /// Leave `paths` out of the values comparison, on both sides.
    pub fn ignoring<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.ignored_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// True iff the release exists, is deployed, was deployed less than
    /// `max_age` ago, runs `target_version` and was given `target_values`.
    pub fn is_current(
        &self,
        recorded: Option<&RecordedRelease>,
        target_version: Option<&str>,
        target_values: &Values,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(recorded) = recorded else {
            return false;
        };
        let release = &recorded.release;
        if !release.is_deployed() {
            return false;
        }
        match release.last_deployed {
            Some(at) if now - at <= self.max_age => {}
            _ => return false,
        }
        if target_version != Some(release.chart_version.as_str()) {
            return false;
        }
        recorded.values.without(&self.ignored_paths) == target_values.without(&self.ignored_paths)
    }
}
