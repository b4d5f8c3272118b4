//! Workflow orchestration.
//!
//! A run is a fixed sequence of steps (launch, login handling, navigation,
//! the target action) driven as a state machine. Each step is recorded with
//! its outcome so a finished run can be reported step by step, and the first
//! failed step halts the run.

mod orchestrator;
mod runner;
mod state;
mod step;

pub use orchestrator::WorkflowOrchestrator;
pub use runner::{spawn_run, InputLease, RunHandle};
pub use state::WorkflowState;
pub use step::{ProgressEvent, RunReport, StepStatus, WorkflowStep};
