//! Workflow state machine states.

/// Where a run currently stands. Transitions are linear except for the
/// login branch: a logged-in profile on the wrong account detours through
/// `LoggingOut`, a logged-out profile goes straight to `LoggingIn`, and a
/// profile already on the right account skips both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    NotLaunched,
    Launching,
    CheckingLogin,
    LoggingOut,
    LoggingIn,
    Navigating,
    LocatingTarget,
    Acting,
    Verified,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Verified | WorkflowState::Failed)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::NotLaunched => "not launched",
            WorkflowState::Launching => "launching",
            WorkflowState::CheckingLogin => "checking login",
            WorkflowState::LoggingOut => "logging out",
            WorkflowState::LoggingIn => "logging in",
            WorkflowState::Navigating => "navigating",
            WorkflowState::LocatingTarget => "locating target",
            WorkflowState::Acting => "acting",
            WorkflowState::Verified => "verified",
            WorkflowState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}
