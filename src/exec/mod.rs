//! Action execution with adaptive verification.
//!
//! Fixed post-action sleeps either waste time or race the UI. The executor
//! instead performs the action and re-polls the screen until a caller-supplied
//! verification predicate accepts a frame or the deadline passes. Frames are
//! captured fresh per tick and dropped before the next capture; nothing here
//! accumulates screenshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{Frame, ScreenSource};
use crate::detect::Point;
use crate::error::{AutomationError, Result};
use crate::input::{clear_and_type, InputDriver, Key};

/// Cooperative cancellation flag shared between the control surface and the
/// worker. Checked at tick boundaries only; an in-flight input event is
/// never interrupted halfway.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Click(Point),
    TypeText(String),
    /// Select-all + delete + type, for fields that may hold stale content.
    ClearAndType(String),
    KeyCombo(Vec<Key>),
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Click(p) => write!(f, "click({}, {})", p.x, p.y),
            Action::TypeText(_) => write!(f, "type_text"),
            Action::ClearAndType(_) => write!(f, "clear_and_type"),
            Action::KeyCombo(keys) => write!(f, "key_combo({} keys)", keys.len()),
        }
    }
}

pub struct ActionExecutor<'a> {
    screen: &'a dyn ScreenSource,
    input: &'a dyn InputDriver,
    poll_interval: Duration,
    cancel: CancelToken,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        screen: &'a dyn ScreenSource,
        input: &'a dyn InputDriver,
        poll_interval: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            screen,
            input,
            poll_interval,
            cancel,
        }
    }

    /// Captures a pre-action frame, performs `action`, then polls freshly
    /// captured frames against `verify` until it accepts one or `max_wait`
    /// elapses.
    ///
    /// Returns `Ok(true)` on verified success, `Ok(false)` on timeout, and
    /// `Err(Cancelled)` if the token fires between ticks. The total wait is
    /// bounded by `max_wait` plus at most one poll interval.
    pub fn execute(
        &self,
        action: &Action,
        verify: &dyn Fn(&Frame) -> bool,
        max_wait: Duration,
    ) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }

        // The pre-action frame proves the UI is capturable before any input
        // is injected. A vanished window fails here as "nothing happened";
        // a failure after the action would be "happened but unverifiable".
        let before = self.screen.capture()?;
        drop(before);

        self.perform(action)?;

        let deadline = Instant::now() + max_wait;
        loop {
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }

            // Each frame lives for one predicate call only.
            let frame = self.screen.capture()?;
            if verify(&frame) {
                return Ok(true);
            }
            drop(frame);

            if Instant::now() >= deadline {
                crate::log(&format!(
                    "Verification of {} timed out after {:.1}s",
                    action,
                    max_wait.as_secs_f32()
                ));
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Performs `action` without any verification wait.
    pub fn perform(&self, action: &Action) -> Result<()> {
        match action {
            Action::Click(point) => self.input.click(*point),
            Action::TypeText(text) => self.input.type_text(text),
            Action::ClearAndType(text) => clear_and_type(self.input, text),
            Action::KeyCombo(keys) => self.input.key_combo(keys),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::fake::{InputEvent, RecordingInput};
    use image::ImageBuffer;
    use std::sync::atomic::AtomicU32;

    /// Screen whose frames carry a counter in the top-left pixel, so tests
    /// can verify "the UI changed after N polls".
    struct CountingScreen {
        captures: AtomicU32,
    }

    impl CountingScreen {
        fn new() -> Self {
            Self {
                captures: AtomicU32::new(0),
            }
        }
    }

    impl ScreenSource for CountingScreen {
        fn capture(&self) -> Result<Frame> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            let mut frame = ImageBuffer::new(4, 4);
            frame.put_pixel(0, 0, image::Rgba([n.min(255) as u8, 0, 0, 255]));
            Ok(frame)
        }
    }

    struct FailingScreen;

    impl ScreenSource for FailingScreen {
        fn capture(&self) -> Result<Frame> {
            Err(AutomationError::Capture("no window".into()))
        }
    }

    fn executor<'a>(
        screen: &'a dyn ScreenSource,
        input: &'a dyn InputDriver,
        cancel: CancelToken,
    ) -> ActionExecutor<'a> {
        ActionExecutor::new(screen, input, Duration::from_millis(5), cancel)
    }

    #[test]
    fn test_verify_success_after_polls() {
        let screen = CountingScreen::new();
        let input = RecordingInput::new();
        let exec = executor(&screen, &input, CancelToken::new());

        // Accept once the counter pixel reaches 3 (fourth capture).
        let verified = exec
            .execute(
                &Action::Click(Point { x: 10, y: 20 }),
                &|frame| frame.get_pixel(0, 0)[0] >= 3,
                Duration::from_millis(500),
            )
            .unwrap();

        assert!(verified);
        assert_eq!(
            input.recorded(),
            vec![InputEvent::Click(Point { x: 10, y: 20 })]
        );
    }

    #[test]
    fn test_timeout_is_bounded() {
        let screen = CountingScreen::new();
        let input = RecordingInput::new();
        let exec = executor(&screen, &input, CancelToken::new());

        let max_wait = Duration::from_millis(50);
        let start = Instant::now();
        let verified = exec
            .execute(&Action::TypeText("x".into()), &|_| false, max_wait)
            .unwrap();
        let elapsed = start.elapsed();

        assert!(!verified);
        // Bounded by max_wait plus one poll interval (with scheduling slack).
        assert!(elapsed < max_wait + Duration::from_millis(50));
    }

    #[test]
    fn test_cancellation_between_ticks() {
        let screen = CountingScreen::new();
        let input = RecordingInput::new();
        let cancel = CancelToken::new();
        let exec = executor(&screen, &input, cancel.clone());

        cancel.cancel();
        let err = exec
            .execute(
                &Action::Click(Point { x: 0, y: 0 }),
                &|_| true,
                Duration::from_millis(100),
            )
            .unwrap_err();

        assert!(matches!(err, AutomationError::Cancelled));
        // Cancelled before the action was performed.
        assert!(input.recorded().is_empty());
    }

    #[test]
    fn test_uncapturable_screen_blocks_input() {
        let screen = FailingScreen;
        let input = RecordingInput::new();
        let exec = executor(&screen, &input, CancelToken::new());

        let err = exec
            .execute(
                &Action::Click(Point { x: 1, y: 2 }),
                &|_| true,
                Duration::from_millis(50),
            )
            .unwrap_err();

        assert!(matches!(err, AutomationError::Capture(_)));
        // The click was never injected into an unverifiable UI.
        assert!(input.recorded().is_empty());
    }

    #[test]
    fn test_clear_and_type_goes_through_field_clear() {
        let screen = CountingScreen::new();
        let input = RecordingInput::new();
        input.seed_field("previous@example.com");
        let exec = executor(&screen, &input, CancelToken::new());

        exec.execute(
            &Action::ClearAndType("account@example.com".into()),
            &|_| true,
            Duration::from_millis(100),
        )
        .unwrap();

        assert_eq!(input.field_content(), "account@example.com");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
