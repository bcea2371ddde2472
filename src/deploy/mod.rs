// Deploy module - Dependency-ordered deployment pipelines
// Validates the named-input graph up front, executes strictly in order,
// and resumes idempotently from persisted completion markers

mod orchestrator;
mod step;

pub use orchestrator::{DeployError, Orchestrator};
pub use step::{Pipeline, StepAction, StepDef};
