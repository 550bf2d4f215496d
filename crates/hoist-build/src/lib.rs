//! Image build planning and execution.
//!
//! [`plan::compile`] decides whether a Dockerfile build is needed and what the
//! resulting image is called, [`plan::BuildPlan::validate`] checks the plan
//! against the filesystem, and [`execute::run`] carries it out.

pub mod cleanup;
pub mod error;
pub mod execute;
pub mod plan;

pub use error::BuildError;
pub use execute::BuildOutput;
pub use plan::{
    BuildOptions, BuildPlan, PROJECT_ID_LABEL, RemoteCache, ServiceBuild, ServiceStep,
    decode_credentials,
};
