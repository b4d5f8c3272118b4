//! Automation error taxonomy.
//!
//! Every failure mode the workflow can hit has its own variant so the
//! orchestrator can distinguish retryable conditions (a slow login) from
//! fatal ones (no shortcut on disk, ambiguous screen state). Diagnostics
//! that help a human fix the setup travel in the variant fields.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutomationError>;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// Every detection tier missed for the named element.
    #[error("UI element \"{element}\" not found on screen")]
    NotFound { element: String },

    /// The screen matched neither the logged-in nor the logged-out state.
    /// Acting on a guess risks typing credentials into the wrong control,
    /// so this always halts the run.
    #[error("screen state is ambiguous: neither logged in nor logged out")]
    AmbiguousState,

    /// No shortcut on disk matched the pattern; nothing was spawned.
    #[error(
        "no shortcut matching \"{pattern}\" in {} (saw {candidates:?})",
        search_dir.display()
    )]
    ShortcutNotFound {
        pattern: String,
        search_dir: PathBuf,
        candidates: Vec<String>,
    },

    /// The shortcut was invoked but the process never appeared.
    #[error(
        "no process matching \"{pattern}\" appeared within {timeout:?} \
         (searched {}, saw {candidates:?})", search_dir.display()
    )]
    LaunchTimeout {
        pattern: String,
        search_dir: PathBuf,
        candidates: Vec<String>,
        timeout: Duration,
    },

    #[error("\"{action}\" was performed but its effect never appeared ({waited:?})")]
    VerificationTimeout { action: String, waited: Duration },

    /// Another run already holds the input lease. Mouse and keyboard are a
    /// machine-wide resource; two concurrent runs would corrupt each other.
    #[error("another automation run is already driving input on this machine")]
    ResourceBusy,

    #[error("run cancelled")]
    Cancelled,

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("input injection failed: {0}")]
    Input(String),

    #[error("text recognition failed: {0}")]
    Ocr(String),
}
