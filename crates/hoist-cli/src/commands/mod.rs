mod build;
mod deploy;
mod down;
mod project;
mod publish;
mod up;

pub use build::build;
pub use deploy::deploy;
pub use down::down;
pub use project::Project;
pub use publish::publish;
pub use up::up;
