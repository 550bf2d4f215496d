//! Core types and configuration for hoist.
//!
//! This crate defines the `hoist.toml` schema ([`HoistConfig`]), image and
//! tag naming ([`LocalImage`]), chart value trees ([`Values`]), retry
//! policies, progress reporting, and the user-facing error classifier
//! ([`UserError`]).

pub mod config;
pub mod environment;
pub mod error;
pub mod image;
pub mod names;
pub mod report;
pub mod retry;
pub mod user_error;
pub mod values;

pub use config::{
    BuildConfig, DeployConfig, HoistConfig, ProjectConfig, PublishConfig, ServiceConfig,
};
pub use environment::Environment;
pub use error::{Error, Result};
pub use image::{LocalImage, generate_tag};
pub use names::{deterministic_slug, to_valid_name};
pub use report::{ConsoleReporter, MemoryReporter, ReportLevel, Reporter};
pub use retry::{RetryError, RetryPolicy, retry};
pub use user_error::{BoxError, UserError, attach_user_message, user_message};
pub use values::Values;
