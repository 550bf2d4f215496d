//! Watch the new app revision's pods while charts are applied.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::FutureExt as _;
use futures::stream::{BoxStream, StreamExt};
use hoist_cloud::{ClusterError, PodEvent};
use hoist_core::UserError;
use tokio_util::sync::CancellationToken;

use crate::deploy::APP_CHART_NAME;
use crate::error::DeployError;

/// Container waiting reasons that mean the app will not come up.
pub const CRASH_REASONS: [&str; 2] = ["CrashLoopBackOff", "RunContainerError"];

/// Label on app pods carrying the chart revision they belong to.
pub const REVISION_LABEL: &str = "hoist.dev/revision";

/// Selector for the pods of `instance` at chart `revision`.
pub fn pod_selector(instance: &str, revision: u32) -> String {
    format!(
        "app.kubernetes.io/name={APP_CHART_NAME},app.kubernetes.io/instance={instance},\
         {REVISION_LABEL}={revision}"
    )
}

/// A container stuck in one of [`CRASH_REASONS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodCrash {
    pub pod: String,
    pub container: String,
    pub reason: String,
    pub message: String,
}

impl PodCrash {
    pub fn from_event(event: &PodEvent) -> Option<Self> {
        event
            .waiting
            .iter()
            .find(|w| CRASH_REASONS.contains(&w.reason.as_str()))
            .map(|w| Self {
                pod: event.pod.clone(),
                container: w.container.clone(),
                reason: w.reason.clone(),
                message: w.message.clone(),
            })
    }

    fn into_error(self) -> DeployError {
        let user = UserError::new(format!(
            "[ERROR]: Application failed to start: {}",
            self.message
        ));
        DeployError::CrashDetected {
            pod: self.pod,
            container: self.container,
            reason: self.reason,
            source: user,
        }
    }
}

/// First crash seen on `events`, or `None` once the stream ends, fails, or
/// `timeout` passes.
pub async fn first_crash(
    mut events: BoxStream<'static, Result<PodEvent, ClusterError>>,
    timeout: Duration,
) -> Option<PodCrash> {
    let scan = async {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(crash) = PodCrash::from_event(&event) {
                        tracing::debug!(pod = %crash.pod, reason = %crash.reason, "crash detected");
                        return Some(crash);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pod watch stopped");
                    return None;
                }
            }
        }
        None
    };
    match tokio::time::timeout(timeout, scan).await {
        Ok(crash) => crash,
        Err(_) => {
            tracing::debug!(?timeout, "pod watch timed out");
            None
        }
    }
}

/// Run `applier` and `watcher` together; the first terminal result wins.
///
/// A crash cancels the applier. When the applier finishes first, a crash the
/// watcher has already observed still fails the deploy. A watcher that
/// returns `None` stops participating.
pub async fn race<T, A, W>(
    applier: A,
    watcher: W,
    cancel: &CancellationToken,
) -> Result<T, DeployError>
where
    A: Future<Output = Result<T, DeployError>>,
    W: Future<Output = Option<PodCrash>>,
{
    let mut applier = pin!(applier);
    let mut watcher = pin!(watcher);
    let mut watching = true;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(DeployError::Cancelled),

            crash = &mut watcher, if watching => match crash {
                Some(crash) => return Err(crash.into_error()),
                None => watching = false,
            },

            result = &mut applier => {
                let late_crash = if watching {
                    watcher.as_mut().now_or_never().flatten()
                } else {
                    None
                };
                return match late_crash {
                    Some(crash) => Err(crash.into_error()),
                    None => result,
                };
            }
        }
    }
}
