//! Synthetic input capability.
//!
//! The executor and workflow drive the mouse and keyboard through the
//! `InputDriver` trait. The Windows `SendInput` implementation lives in the
//! platform submodule; tests use in-memory fakes.

use crate::detect::Point;
use crate::error::Result;

#[cfg(windows)]
pub mod sendinput;

#[cfg(windows)]
pub use sendinput::SendInputDriver;

/// Keys usable in combos. Modifiers are held for the duration of the combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Ctrl,
    Shift,
    Alt,
    Enter,
    Tab,
    Delete,
    Char(char),
}

/// Hardware-level input injection.
pub trait InputDriver: Send + Sync {
    /// Left-clicks at the given frame coordinate.
    fn click(&self, point: Point) -> Result<()>;

    /// Types a string into the currently focused control.
    fn type_text(&self, text: &str) -> Result<()>;

    /// Presses a key combination (modifiers first, e.g. `[Ctrl, Char('a')]`).
    fn key_combo(&self, keys: &[Key]) -> Result<()>;
}

/// Clears the focused field via select-all + delete, then types `text`.
///
/// Always clearing first prevents concatenating new input onto stale field
/// content left over from a previous session.
pub fn clear_and_type(driver: &dyn InputDriver, text: &str) -> Result<()> {
    driver.key_combo(&[Key::Ctrl, Key::Char('a')])?;
    driver.key_combo(&[Key::Delete])?;
    driver.type_text(text)
}


#[cfg(test)]
mod tests {
    use super::fake::{InputEvent, RecordingInput};
    use super::*;

    #[test]
    fn test_clear_and_type_replaces_stale_content() {
        let input = RecordingInput::new();
        input.seed_field("old-account@example.com");

        clear_and_type(&input, "new-account@example.com").unwrap();

        // Exactly the new string; never a concatenation with prior content.
        assert_eq!(input.field_content(), "new-account@example.com");
    }

    #[test]
    fn test_clear_and_type_event_order() {
        let input = RecordingInput::new();
        clear_and_type(&input, "abc").unwrap();

        assert_eq!(
            input.recorded(),
            vec![
                InputEvent::Combo(vec![Key::Ctrl, Key::Char('a')]),
                InputEvent::Combo(vec![Key::Delete]),
                InputEvent::Type("abc".into()),
            ]
        );
    }

    #[test]
    fn test_type_without_clear_concatenates() {
        // Documents the hazard clear_and_type exists to avoid.
        let input = RecordingInput::new();
        input.seed_field("stale");
        input.type_text("fresh").unwrap();
        assert_eq!(input.field_content(), "stalefresh");
    }
}
