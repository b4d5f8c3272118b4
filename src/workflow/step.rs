//! Step records and run reporting.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "ok"),
            StepStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One executed (or executing) workflow step.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub name: String,
    pub status: StepStatus,
    /// Human-readable outcome: what was matched, which method, or why the
    /// step failed.
    pub detail: String,
    pub duration: Duration,
}

impl WorkflowStep {
    pub fn running(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Running,
            detail: String::new(),
            duration: Duration::ZERO,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:>6}] {} ({:.1}s){}{}",
            self.status,
            self.name,
            self.duration.as_secs_f32(),
            if self.detail.is_empty() { "" } else { ": " },
            self.detail
        )
    }
}

/// Progress notification sent over the runner channel each time a step
/// starts or finishes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub step: WorkflowStep,
}

/// Final outcome of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub steps: Vec<WorkflowStep>,
    pub success: bool,
}

impl RunReport {
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        write!(f, "result: {}", if self.success { "SUCCESS" } else { "FAILED" })
    }
}
