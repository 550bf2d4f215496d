//! Publish, deploy and teardown for hoist, plus the `up` pipeline.

pub mod deploy;
pub mod down;
pub mod error;
pub mod pipeline;
pub mod publish;

pub use deploy::{
    APP_CHART_NAME, ChartConfig, DeployOptions, DeployOutput, DeployPlan, ExternalChart,
    RUNTIME_RELEASE,
};
pub use down::{DownOptions, DownPlan};
pub use error::{DeployError, DownError, PipelineError, PublishError};
pub use pipeline::{Orchestrator, UpOptions, UpOutput};
pub use publish::{PublishOptions, PublishOutput, PublishPlan};
