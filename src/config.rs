//! Automation configuration.
//!
//! Loaded once from config.json and passed explicitly to the orchestrator
//! at construction. There is no global config instance; every component
//! that needs a setting receives it through its constructor.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A point in relative coordinates (0.0 to 1.0), scaled to the captured
/// frame at use time. Used for fixed fallback click positions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RelativePoint {
    /// X position (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
}

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for restricting template search to a screen region for speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RelativeRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Describes how one named UI element is located.
///
/// Tiers that have no data here are skipped: an element without a template
/// goes straight from exact OCR to fuzzy OCR, an element without a fallback
/// point has no last-resort coordinate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Stable element name used by the workflow (e.g. "logout").
    pub name: String,
    /// Template image name in the template store, if one exists.
    #[serde(default)]
    pub template: Option<String>,
    /// Text to search for via OCR, if the element carries a label.
    #[serde(default)]
    pub ocr_text: Option<String>,
    /// Search region restriction for the template tiers.
    #[serde(default)]
    pub search_region: Option<RelativeRect>,
    /// Fixed fallback coordinate, used only when every other tier fails.
    #[serde(default)]
    pub fallback: Option<RelativePoint>,
}

impl ElementSpec {
    /// A spec that is located purely by its visible text.
    pub fn text_only(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            template: None,
            ocr_text: Some(text.to_string()),
            search_region: None,
            fallback: None,
        }
    }
}

/// Complete automation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Directory searched for launchable shortcuts.
    #[serde(default = "default_shortcut_dir")]
    pub shortcut_dir: PathBuf,
    /// Directory holding reference template images.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    /// Maximum time to wait for the launched process to appear (ms).
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
    /// Interval between process-list polls during launch (ms).
    #[serde(default = "default_launch_poll_ms")]
    pub launch_poll_ms: u64,
    /// Interval between verification polls after an action (ms).
    #[serde(default = "default_action_poll_ms")]
    pub action_poll_ms: u64,
    /// Default bound on action verification (ms).
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    /// Bound on login/logout confirmation (ms); these involve a network
    /// round trip in the target app and take longer than a local click.
    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,
    /// Template confidence for the strict tier.
    #[serde(default = "default_template_high")]
    pub template_high_threshold: f32,
    /// Template confidence for the relaxed tier.
    #[serde(default = "default_template_low")]
    pub template_low_threshold: f32,
    /// Minimum string similarity for the fuzzy OCR tier (0.0-1.0).
    #[serde(default = "default_fuzzy_min")]
    pub fuzzy_min_similarity: f32,
    /// How many times the login step may be retried before failing the run.
    #[serde(default = "default_max_login_retries")]
    pub max_login_retries: u32,
    /// The UI elements the workflow knows how to locate.
    #[serde(default = "default_elements")]
    pub elements: Vec<ElementSpec>,
}

fn default_shortcut_dir() -> PathBuf {
    crate::paths::default_shortcut_dir()
}

fn default_template_dir() -> PathBuf {
    crate::paths::get_template_dir()
}

fn default_launch_timeout_ms() -> u64 {
    10_000
}

fn default_launch_poll_ms() -> u64 {
    500
}

fn default_action_poll_ms() -> u64 {
    500
}

fn default_action_timeout_ms() -> u64 {
    10_000
}

fn default_login_timeout_ms() -> u64 {
    30_000
}

fn default_template_high() -> f32 {
    0.97
}

fn default_template_low() -> f32 {
    0.85
}

fn default_fuzzy_min() -> f32 {
    0.90
}

fn default_max_login_retries() -> u32 {
    2
}

/// Well-known element names the workflow depends on.
pub mod elements {
    /// Marker that a profile is logged in (avatar / profile menu button).
    pub const PROFILE_MENU: &str = "profile_menu";
    /// Logout control inside the opened profile menu.
    pub const LOGOUT: &str = "logout";
    /// Marker that the login form is showing.
    pub const LOGIN_FORM: &str = "login_form";
    pub const EMAIL_FIELD: &str = "email_field";
    pub const PASSWORD_FIELD: &str = "password_field";
    pub const SUBMIT: &str = "submit";
    /// The actionable control on the target page (e.g. upload trigger).
    pub const ACTION_TRIGGER: &str = "action_trigger";
    /// Element whose appearance confirms the action took effect.
    pub const ACTION_CONFIRM: &str = "action_confirm";
}

fn default_elements() -> Vec<ElementSpec> {
    use elements::*;
    vec![
        ElementSpec {
            name: PROFILE_MENU.into(),
            template: Some("profile_menu".into()),
            ocr_text: Some("My profile".into()),
            search_region: None,
            fallback: None,
        },
        ElementSpec {
            name: LOGOUT.into(),
            template: Some("logout".into()),
            ocr_text: Some("Log out".into()),
            search_region: None,
            fallback: None,
        },
        ElementSpec {
            name: LOGIN_FORM.into(),
            template: Some("login_form".into()),
            ocr_text: Some("Sign in".into()),
            search_region: None,
            fallback: None,
        },
        ElementSpec {
            name: EMAIL_FIELD.into(),
            template: Some("email_field".into()),
            ocr_text: Some("Email".into()),
            search_region: None,
            fallback: Some(RelativePoint { x: 0.5, y: 0.42 }),
        },
        ElementSpec {
            name: PASSWORD_FIELD.into(),
            template: Some("password_field".into()),
            ocr_text: Some("Password".into()),
            search_region: None,
            fallback: Some(RelativePoint { x: 0.5, y: 0.52 }),
        },
        ElementSpec {
            name: SUBMIT.into(),
            template: Some("submit".into()),
            ocr_text: Some("Sign in".into()),
            search_region: None,
            fallback: Some(RelativePoint { x: 0.5, y: 0.62 }),
        },
        ElementSpec {
            name: ACTION_TRIGGER.into(),
            template: Some("action_trigger".into()),
            ocr_text: Some("Upload".into()),
            search_region: None,
            fallback: None,
        },
        ElementSpec {
            name: ACTION_CONFIRM.into(),
            template: Some("action_confirm".into()),
            ocr_text: Some("Create post".into()),
            search_region: None,
            fallback: None,
        },
    ]
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            shortcut_dir: default_shortcut_dir(),
            template_dir: default_template_dir(),
            launch_timeout_ms: default_launch_timeout_ms(),
            launch_poll_ms: default_launch_poll_ms(),
            action_poll_ms: default_action_poll_ms(),
            action_timeout_ms: default_action_timeout_ms(),
            login_timeout_ms: default_login_timeout_ms(),
            template_high_threshold: default_template_high(),
            template_low_threshold: default_template_low(),
            fuzzy_min_similarity: default_fuzzy_min(),
            max_login_retries: default_max_login_retries(),
            elements: default_elements(),
        }
    }
}

impl AutomationConfig {
    /// Loads configuration from the given path, or returns defaults when
    /// the file is missing or unparsable. A broken config file should not
    /// brick the tool; it is logged and the defaults take over.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(config) => {
                        crate::log(&format!("Config loaded from {}", path.display()));
                        return config;
                    }
                    Err(e) => {
                        crate::log(&format!(
                            "Failed to parse {}: {}. Using defaults.",
                            path.display(),
                            e
                        ));
                    }
                },
                Err(e) => {
                    crate::log(&format!(
                        "Failed to read {}: {}. Using defaults.",
                        path.display(),
                        e
                    ));
                }
            }
        } else {
            crate::log(&format!(
                "{} not found. Using default config.",
                path.display()
            ));
        }

        AutomationConfig::default()
    }

    /// Looks up a named element spec.
    pub fn element(&self, name: &str) -> Option<&ElementSpec> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn launch_poll(&self) -> Duration {
        Duration::from_millis(self.launch_poll_ms)
    }

    pub fn action_poll(&self) -> Duration {
        Duration::from_millis(self.action_poll_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_workflow_elements() {
        let config = AutomationConfig::default();
        for name in [
            elements::PROFILE_MENU,
            elements::LOGOUT,
            elements::LOGIN_FORM,
            elements::EMAIL_FIELD,
            elements::PASSWORD_FIELD,
            elements::SUBMIT,
            elements::ACTION_TRIGGER,
            elements::ACTION_CONFIRM,
        ] {
            assert!(config.element(name).is_some(), "missing element {}", name);
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AutomationConfig::load_or_default(Path::new("does_not_exist.json"));
        assert_eq!(config.template_high_threshold, 0.97);
        assert_eq!(config.template_low_threshold, 0.85);
        assert_eq!(config.fuzzy_min_similarity, 0.90);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"launch_timeout_ms": 5000}"#).unwrap();

        let config = AutomationConfig::load_or_default(&path);
        assert_eq!(config.launch_timeout_ms, 5000);
        assert_eq!(config.action_poll_ms, 500);
        assert!(!config.elements.is_empty());
    }
}
