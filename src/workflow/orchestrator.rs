//! The run state machine.
//!
//! Drives one profile from launch to a verified action. Each state maps to
//! one recorded step; the first failed step moves the machine to `Failed`
//! and the run halts. Login is the only branching point: an already
//! logged-in profile on the right account skips straight to navigation, a
//! wrong account detours through logout, and an ambiguous screen stops the
//! run rather than guessing.

use std::sync::mpsc::Sender;
use std::time::Instant;

use super::state::WorkflowState;
use super::step::{ProgressEvent, RunReport, StepStatus, WorkflowStep};
use crate::capture::{Frame, ScreenSource};
use crate::config::{elements, AutomationConfig, ElementSpec};
use crate::credentials::Credential;
use crate::detect::{MatchResult, OcrEngine, Point, ScreenState, TemplateStore, UIStateDetector};
use crate::error::{AutomationError, Result};
use crate::exec::{Action, ActionExecutor, CancelToken};
use crate::input::InputDriver;
use crate::launch::{ProcessLauncher, ProcessProbe, ProfileManagerKind};

pub struct WorkflowOrchestrator<'a> {
    executor: ActionExecutor<'a>,
    detector: UIStateDetector<'a>,
    screen: &'a dyn ScreenSource,
    probe: &'a dyn ProcessProbe,
    config: &'a AutomationConfig,
    credential: &'a Credential,
    kind: ProfileManagerKind,
    shortcut_pattern: String,
    cancel: CancelToken,
    progress: Option<Sender<ProgressEvent>>,
    state: WorkflowState,
    steps: Vec<WorkflowStep>,
    step_started: Instant,
    target_point: Option<Point>,
}

impl<'a> WorkflowOrchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        screen: &'a dyn ScreenSource,
        input: &'a dyn InputDriver,
        ocr: &'a dyn OcrEngine,
        probe: &'a dyn ProcessProbe,
        templates: &'a TemplateStore,
        config: &'a AutomationConfig,
        credential: &'a Credential,
        kind: ProfileManagerKind,
        shortcut_pattern: &str,
        cancel: CancelToken,
    ) -> Self {
        Self {
            executor: ActionExecutor::new(screen, input, config.action_poll(), cancel.clone()),
            detector: UIStateDetector::new(templates, ocr, config),
            screen,
            probe,
            config,
            credential,
            kind,
            shortcut_pattern: shortcut_pattern.to_string(),
            cancel,
            progress: None,
            state: WorkflowState::NotLaunched,
            steps: Vec::new(),
            step_started: Instant::now(),
            target_point: None,
        }
    }

    /// Attaches a channel that receives a snapshot of each step as it
    /// starts and as it finishes.
    pub fn with_progress(mut self, sender: Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Runs the workflow to a terminal state and reports every step.
    pub fn run(mut self) -> RunReport {
        crate::log(&format!("Run started: {}", self.credential));

        while !self.state.is_terminal() {
            if self.cancel.is_cancelled() {
                self.begin_step("cancelled");
                self.finish_step(StepStatus::Failed, "run cancelled".into());
                self.state = WorkflowState::Failed;
                break;
            }
            self.step();
        }

        let success = self.state == WorkflowState::Verified;
        crate::log(&format!(
            "Run finished: {} ({} steps)",
            self.state,
            self.steps.len()
        ));
        RunReport {
            steps: self.steps,
            success,
        }
    }

    fn step(&mut self) {
        // Entering the launcher is its own transition, so the state is
        // accurate while the launch step runs.
        if self.state == WorkflowState::NotLaunched {
            crate::log(&format!(
                "State: {} -> {}",
                WorkflowState::NotLaunched,
                WorkflowState::Launching
            ));
            self.state = WorkflowState::Launching;
            return;
        }

        let name = match self.state {
            WorkflowState::NotLaunched | WorkflowState::Launching => "launch",
            WorkflowState::CheckingLogin => "check_login",
            WorkflowState::LoggingOut => "logout",
            WorkflowState::LoggingIn => "login",
            WorkflowState::Navigating => "navigate",
            WorkflowState::LocatingTarget => "locate_target",
            WorkflowState::Acting => "execute_action",
            WorkflowState::Verified | WorkflowState::Failed => return,
        };

        self.begin_step(name);
        let outcome = match self.state {
            WorkflowState::NotLaunched | WorkflowState::Launching => self.do_launch(),
            WorkflowState::CheckingLogin => self.do_check_login(),
            WorkflowState::LoggingOut => self.do_logout(),
            WorkflowState::LoggingIn => self.do_login(),
            WorkflowState::Navigating => self.do_navigate(),
            WorkflowState::LocatingTarget => self.do_locate_target(),
            WorkflowState::Acting => self.do_act(),
            WorkflowState::Verified | WorkflowState::Failed => unreachable!(),
        };

        match outcome {
            Ok((detail, next)) => {
                self.finish_step(StepStatus::Succeeded, detail);
                crate::log(&format!("State: {} -> {}", self.state, next));
                self.state = next;
            }
            Err(e) => {
                self.finish_step(StepStatus::Failed, e.to_string());
                self.state = WorkflowState::Failed;
            }
        }
    }

    fn do_launch(&mut self) -> Result<(String, WorkflowState)> {
        let launcher = ProcessLauncher::new(
            self.probe,
            &self.config.shortcut_dir,
            self.config.launch_poll(),
            self.config.launch_timeout(),
        );
        let result = launcher.launch(self.kind, &self.shortcut_pattern)?;

        // A missing shortcut and an expired poll are different failures:
        // the first never spawned anything, the second did.
        if !result.file_exists {
            return Err(AutomationError::ShortcutNotFound {
                pattern: result.pattern,
                search_dir: result.search_dir,
                candidates: result.candidates,
            });
        }
        if !result.process_started {
            return Err(AutomationError::LaunchTimeout {
                pattern: result.pattern,
                search_dir: result.search_dir,
                candidates: result.candidates,
                timeout: self.config.launch_timeout(),
            });
        }

        Ok((
            format!("process up after {:.1}s", result.elapsed.as_secs_f32()),
            WorkflowState::CheckingLogin,
        ))
    }

    fn do_check_login(&mut self) -> Result<(String, WorkflowState)> {
        let frame = self.screen.capture()?;
        let logged_in_marker = self.element(elements::PROFILE_MENU)?;
        let login_form = self.element(elements::LOGIN_FORM)?;

        match self
            .detector
            .classify_login_state(&frame, &logged_in_marker, &login_form)
        {
            ScreenState::Unclear => Err(AutomationError::AmbiguousState),
            ScreenState::LoggedOut => {
                Ok(("logged out, login needed".into(), WorkflowState::LoggingIn))
            }
            ScreenState::LoggedIn => {
                // Logged in, but possibly as the wrong account.
                let email = self.credential.email.to_lowercase();
                let on_account = self
                    .detector
                    .visible_text(&frame)
                    .iter()
                    .any(|w| w.to_lowercase() == email);
                if on_account {
                    Ok((
                        format!("already logged in as {}", self.credential.email),
                        WorkflowState::Navigating,
                    ))
                } else {
                    Ok((
                        "logged in under a different account".into(),
                        WorkflowState::LoggingOut,
                    ))
                }
            }
        }
    }

    fn do_logout(&mut self) -> Result<(String, WorkflowState)> {
        let menu = self.element(elements::PROFILE_MENU)?;
        let logout = self.element(elements::LOGOUT)?;
        let login_form = self.element(elements::LOGIN_FORM)?;

        // Open the profile menu; the logout control appearing confirms it.
        let frame = self.screen.capture()?;
        let menu_point = self.locate_required(&menu, &frame)?;
        let opened = self.executor.execute(
            &Action::Click(menu_point),
            &|frame| self.detector.locate(&logout, frame).found,
            self.config.action_timeout(),
        )?;
        if !opened {
            return Err(AutomationError::VerificationTimeout {
                action: "open profile menu".into(),
                waited: self.config.action_timeout(),
            });
        }

        // Click logout; the login form appearing confirms it. This involves
        // a server round trip, so the longer login timeout applies.
        let frame = self.screen.capture()?;
        let logout_point = self.locate_required(&logout, &frame)?;
        let logged_out = self.executor.execute(
            &Action::Click(logout_point),
            &|frame| self.detector.locate(&login_form, frame).found,
            self.config.login_timeout(),
        )?;
        if !logged_out {
            return Err(AutomationError::VerificationTimeout {
                action: "log out".into(),
                waited: self.config.login_timeout(),
            });
        }

        Ok(("logged out".into(), WorkflowState::LoggingIn))
    }

    fn do_login(&mut self) -> Result<(String, WorkflowState)> {
        let email_field = self.element(elements::EMAIL_FIELD)?;
        let password_field = self.element(elements::PASSWORD_FIELD)?;
        let submit = self.element(elements::SUBMIT)?;
        let logged_in_marker = self.element(elements::PROFILE_MENU)?;

        let attempts = 1 + self.config.max_login_retries;
        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            if attempt > 1 {
                crate::log(&format!("Login attempt {} of {}", attempt, attempts));
            }

            // Fields are always cleared before typing; a previous session
            // may have left stale text in them.
            let frame = self.screen.capture()?;
            let email_point = self.locate_required(&email_field, &frame)?;
            self.executor.perform(&Action::Click(email_point))?;
            self.executor
                .perform(&Action::ClearAndType(self.credential.email.clone()))?;

            let frame = self.screen.capture()?;
            let password_point = self.locate_required(&password_field, &frame)?;
            self.executor.perform(&Action::Click(password_point))?;
            self.executor
                .perform(&Action::ClearAndType(self.credential.secret.clone()))?;

            let frame = self.screen.capture()?;
            let submit_point = self.locate_required(&submit, &frame)?;
            let logged_in = self.executor.execute(
                &Action::Click(submit_point),
                &|frame| self.detector.locate(&logged_in_marker, frame).found,
                self.config.login_timeout(),
            )?;

            if logged_in {
                return Ok((
                    format!(
                        "logged in as {} (attempt {})",
                        self.credential.email, attempt
                    ),
                    WorkflowState::Navigating,
                ));
            }
            crate::log(&format!(
                "Login not confirmed within {:.0}s",
                self.config.login_timeout().as_secs_f32()
            ));
        }

        Err(AutomationError::VerificationTimeout {
            action: format!("login ({} attempts)", attempts),
            waited: self.config.login_timeout() * attempts,
        })
    }

    fn do_navigate(&mut self) -> Result<(String, WorkflowState)> {
        let page = ElementSpec::text_only("target_page", &self.credential.target_page);
        let trigger = self.element(elements::ACTION_TRIGGER)?;

        let frame = self.screen.capture()?;
        let result = self.detector.locate(&page, &frame);
        let Some(page_point) = result.location.filter(|_| result.found) else {
            // Log what is on screen so a renamed page can be diagnosed.
            let visible = self.detector.visible_text(&frame);
            crate::log(&format!(
                "Page \"{}\" not found; visible text: {:?}",
                self.credential.target_page, visible
            ));
            return Err(AutomationError::NotFound {
                element: format!("page \"{}\"", self.credential.target_page),
            });
        };

        let arrived = self.executor.execute(
            &Action::Click(page_point),
            &|frame| self.detector.locate(&trigger, frame).found,
            self.config.action_timeout(),
        )?;
        if !arrived {
            return Err(AutomationError::VerificationTimeout {
                action: format!("open page \"{}\"", self.credential.target_page),
                waited: self.config.action_timeout(),
            });
        }

        Ok((
            format!("on page \"{}\"", self.credential.target_page),
            WorkflowState::LocatingTarget,
        ))
    }

    fn do_locate_target(&mut self) -> Result<(String, WorkflowState)> {
        let trigger = self.element(elements::ACTION_TRIGGER)?;
        let frame = self.screen.capture()?;
        let result = self.detector.locate(&trigger, &frame);
        let Some(point) = result.location.filter(|_| result.found) else {
            return Err(AutomationError::NotFound {
                element: trigger.name.clone(),
            });
        };

        self.target_point = Some(point);
        Ok((describe_match(&trigger.name, &result), WorkflowState::Acting))
    }

    fn do_act(&mut self) -> Result<(String, WorkflowState)> {
        let trigger = self.element(elements::ACTION_TRIGGER)?;
        let confirm = self.element(elements::ACTION_CONFIRM)?;
        let point = self.target_point.ok_or(AutomationError::NotFound {
            element: trigger.name.clone(),
        })?;

        let confirmed = self.executor.execute(
            &Action::Click(point),
            &|frame| self.detector.locate(&confirm, frame).found,
            self.config.action_timeout(),
        )?;
        if !confirmed {
            return Err(AutomationError::VerificationTimeout {
                action: format!("click {}", trigger.name),
                waited: self.config.action_timeout(),
            });
        }

        Ok(("action confirmed".into(), WorkflowState::Verified))
    }

    fn element(&self, name: &str) -> Result<ElementSpec> {
        self.config
            .element(name)
            .cloned()
            .ok_or_else(|| AutomationError::NotFound {
                element: name.to_string(),
            })
    }

    fn locate_required(&self, spec: &ElementSpec, frame: &Frame) -> Result<Point> {
        let result = self.detector.locate(spec, frame);
        match result.location {
            Some(point) if result.found => Ok(point),
            _ => Err(AutomationError::NotFound {
                element: spec.name.clone(),
            }),
        }
    }

    fn begin_step(&mut self, name: &str) {
        crate::log(&format!("Step {} started", name));
        self.step_started = Instant::now();
        let step = WorkflowStep::running(name);
        self.emit(&step);
        self.steps.push(step);
    }

    fn finish_step(&mut self, status: StepStatus, detail: String) {
        let Some(step) = self.steps.last_mut() else {
            return;
        };
        step.status = status;
        step.detail = detail;
        step.duration = self.step_started.elapsed();
        let snapshot = step.clone();
        crate::log(&format!("{}", snapshot));
        self.emit(&snapshot);
    }

    fn emit(&self, step: &WorkflowStep) {
        if let Some(sender) = &self.progress {
            // A dropped receiver only means nobody is watching.
            let _ = sender.send(ProgressEvent { step: step.clone() });
        }
    }
}

fn describe_match(name: &str, result: &MatchResult) -> String {
    match result.method {
        Some(method) => format!(
            "{} found via {:?} (confidence {:.2})",
            name, method, result.confidence
        ),
        None => format!("{} found", name),
    }
}
