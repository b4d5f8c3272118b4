//! Process launch and verification.
//!
//! The profile manager has no API, so starting it means finding its
//! shortcut on disk, invoking it, and polling the OS process list until
//! the process appears. Launch never retries internally; retry policy
//! belongs to the orchestrator.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::Result;

#[cfg(windows)]
pub mod process;

#[cfg(windows)]
pub use process::WindowsProcessProbe;

/// The supported profile managers. A small closed set with a shared
/// launch/detect interface; `GenericShortcut` covers anything launchable
/// purely by shortcut name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileManagerKind {
    GoLogin,
    Incogniton,
    GenericShortcut,
}

impl ProfileManagerKind {
    /// Executable name polled for in the process list, when known.
    pub fn process_name(&self) -> Option<&'static str> {
        match self {
            ProfileManagerKind::GoLogin => Some("GoLogin.exe"),
            ProfileManagerKind::Incogniton => Some("Incogniton.exe"),
            ProfileManagerKind::GenericShortcut => None,
        }
    }

    /// Default shortcut-name pattern.
    pub fn default_pattern(&self) -> &'static str {
        match self {
            ProfileManagerKind::GoLogin => "gologin",
            ProfileManagerKind::Incogniton => "incogniton",
            ProfileManagerKind::GenericShortcut => "",
        }
    }
}

impl std::str::FromStr for ProfileManagerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gologin" => Ok(ProfileManagerKind::GoLogin),
            "incogniton" => Ok(ProfileManagerKind::Incogniton),
            "generic" | "shortcut" => Ok(ProfileManagerKind::GenericShortcut),
            other => Err(format!("unknown profile manager kind: {}", other)),
        }
    }
}

/// OS process capability: enumeration by executable name plus spawning a
/// shortcut/executable file.
pub trait ProcessProbe: Send + Sync {
    fn is_process_running(&self, process_name: &str) -> bool;
    fn spawn_shortcut(&self, path: &Path) -> Result<()>;
}

/// Outcome of one launch attempt, created once per attempt and used by the
/// orchestrator to decide between retry and fatal failure.
#[derive(Debug, Clone)]
pub struct LaunchResult {
    /// The shortcut chosen, when one matched the pattern.
    pub shortcut_path: Option<PathBuf>,
    pub file_exists: bool,
    pub process_started: bool,
    pub elapsed: Duration,
    /// Every file seen in the launch directory, kept for diagnostics when
    /// nothing matched ("found 3 shortcuts, none matched — here they are").
    pub candidates: Vec<String>,
    pub pattern: String,
    pub search_dir: PathBuf,
}

pub struct ProcessLauncher<'a> {
    probe: &'a dyn ProcessProbe,
    shortcut_dir: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a> ProcessLauncher<'a> {
    pub fn new(
        probe: &'a dyn ProcessProbe,
        shortcut_dir: &Path,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            shortcut_dir: shortcut_dir.to_path_buf(),
            poll_interval,
            timeout,
        }
    }

    /// Launches the profile manager matching `pattern` (case-insensitive
    /// shortcut-name substring).
    ///
    /// Already-running targets short-circuit without spawning a second
    /// instance. A missing shortcut returns immediately with the full
    /// candidate list. Otherwise the shortcut is invoked and the process
    /// list polled until the target appears or the timeout elapses.
    pub fn launch(&self, kind: ProfileManagerKind, pattern: &str) -> Result<LaunchResult> {
        let start = Instant::now();
        let candidates = self.list_candidates();

        let pattern_lower = pattern.to_lowercase();
        let matched: Vec<&String> = candidates
            .iter()
            .filter(|name| name.to_lowercase().contains(&pattern_lower))
            .collect();

        let Some(shortcut_name) = matched.first() else {
            crate::log(&format!(
                "No shortcut matching \"{}\" in {} ({} candidates: {:?})",
                pattern,
                self.shortcut_dir.display(),
                candidates.len(),
                candidates
            ));
            return Ok(LaunchResult {
                shortcut_path: None,
                file_exists: false,
                process_started: false,
                elapsed: start.elapsed(),
                candidates,
                pattern: pattern.to_string(),
                search_dir: self.shortcut_dir.clone(),
            });
        };
        let shortcut_path = self.shortcut_dir.join(shortcut_name);

        let process_name = match kind.process_name() {
            Some(name) => name.to_string(),
            // Derive from the shortcut stem for the generic kind.
            None => {
                let stem = shortcut_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| pattern.to_string());
                format!("{}.exe", stem)
            }
        };

        // Idempotent short-circuit: never spawn a second instance.
        if self.probe.is_process_running(&process_name) {
            crate::log(&format!("{} already running, not relaunching", process_name));
            return Ok(LaunchResult {
                shortcut_path: Some(shortcut_path),
                file_exists: true,
                process_started: true,
                elapsed: start.elapsed(),
                candidates,
                pattern: pattern.to_string(),
                search_dir: self.shortcut_dir.clone(),
            });
        }

        crate::log(&format!("Launching {}", shortcut_path.display()));
        self.probe.spawn_shortcut(&shortcut_path)?;

        let process_started = loop {
            if self.probe.is_process_running(&process_name) {
                break true;
            }
            if start.elapsed() >= self.timeout {
                break false;
            }
            std::thread::sleep(self.poll_interval);
        };

        crate::log(&format!(
            "Launch of {}: started={} in {:.1}s",
            process_name,
            process_started,
            start.elapsed().as_secs_f32()
        ));

        Ok(LaunchResult {
            shortcut_path: Some(shortcut_path),
            file_exists: true,
            process_started,
            elapsed: start.elapsed(),
            candidates,
            pattern: pattern.to_string(),
            search_dir: self.shortcut_dir.clone(),
        })
    }

    fn list_candidates(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.shortcut_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Probe whose "running" answer flips after a configurable number of
    /// polls, recording every spawn.
    struct FakeProbe {
        running_after_polls: Mutex<Option<u32>>,
        polls: AtomicU32,
        spawns: Mutex<Vec<PathBuf>>,
    }

    impl FakeProbe {
        /// `None` means the process never appears.
        fn new(running_after_polls: Option<u32>) -> Self {
            Self {
                running_after_polls: Mutex::new(running_after_polls),
                polls: AtomicU32::new(0),
                spawns: Mutex::new(Vec::new()),
            }
        }

        fn spawn_count(&self) -> usize {
            self.spawns.lock().unwrap().len()
        }
    }

    impl ProcessProbe for FakeProbe {
        fn is_process_running(&self, _process_name: &str) -> bool {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst);
            match *self.running_after_polls.lock().unwrap() {
                Some(after) => polls >= after,
                None => false,
            }
        }

        fn spawn_shortcut(&self, path: &Path) -> Result<()> {
            self.spawns.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn shortcut_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    fn launcher<'a>(probe: &'a FakeProbe, dir: &Path) -> ProcessLauncher<'a> {
        ProcessLauncher::new(
            probe,
            dir,
            Duration::from_millis(5),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_cold_launch_success() {
        let dir = shortcut_dir(&["GoLogin.lnk", "Chrome.lnk"]);
        // Not running on the first check, appears on the second.
        let probe = FakeProbe::new(Some(1));
        let result = launcher(&probe, dir.path())
            .launch(ProfileManagerKind::GoLogin, "gologin")
            .unwrap();

        assert!(result.file_exists);
        assert!(result.process_started);
        assert_eq!(probe.spawn_count(), 1);
        assert_eq!(
            result.shortcut_path.unwrap().file_name().unwrap(),
            "GoLogin.lnk"
        );
    }

    #[test]
    fn test_missing_shortcut_returns_candidates() {
        let dir = shortcut_dir(&["Chrome.lnk", "Firefox.lnk"]);
        let probe = FakeProbe::new(Some(0));
        let result = launcher(&probe, dir.path())
            .launch(ProfileManagerKind::GoLogin, "gologin")
            .unwrap();

        assert!(!result.file_exists);
        assert!(!result.process_started);
        assert_eq!(result.candidates, vec!["Chrome.lnk", "Firefox.lnk"]);
        assert_eq!(probe.spawn_count(), 0);
    }

    #[test]
    fn test_idempotent_when_already_running() {
        let dir = shortcut_dir(&["GoLogin.lnk"]);
        let probe = FakeProbe::new(Some(0));

        let launcher = launcher(&probe, dir.path());
        let first = launcher
            .launch(ProfileManagerKind::GoLogin, "gologin")
            .unwrap();
        let second = launcher
            .launch(ProfileManagerKind::GoLogin, "gologin")
            .unwrap();

        assert!(first.process_started);
        assert!(second.process_started);
        // Neither call spawned: the target was already running.
        assert_eq!(probe.spawn_count(), 0);
    }

    #[test]
    fn test_launch_timeout() {
        let dir = shortcut_dir(&["GoLogin.lnk"]);
        let probe = FakeProbe::new(None);
        let result = launcher(&probe, dir.path())
            .launch(ProfileManagerKind::GoLogin, "gologin")
            .unwrap();

        assert!(result.file_exists);
        assert!(!result.process_started);
        assert!(result.elapsed >= Duration::from_millis(200));
        assert_eq!(probe.spawn_count(), 1);
    }

    #[test]
    fn test_case_insensitive_pattern() {
        let dir = shortcut_dir(&["GOLOGIN Desktop.LNK"]);
        let probe = FakeProbe::new(Some(0));
        let result = launcher(&probe, dir.path())
            .launch(ProfileManagerKind::GoLogin, "GoLogin")
            .unwrap();
        assert!(result.file_exists);
    }

    #[test]
    fn test_generic_kind_derives_process_name() {
        let dir = shortcut_dir(&["MyTool.lnk"]);
        let probe = FakeProbe::new(Some(0));
        let result = launcher(&probe, dir.path())
            .launch(ProfileManagerKind::GenericShortcut, "mytool")
            .unwrap();
        // Already "running" per the probe: short-circuit, no spawn.
        assert!(result.process_started);
        assert_eq!(probe.spawn_count(), 0);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "gologin".parse::<ProfileManagerKind>().unwrap(),
            ProfileManagerKind::GoLogin
        );
        assert_eq!(
            "Incogniton".parse::<ProfileManagerKind>().unwrap(),
            ProfileManagerKind::Incogniton
        );
        assert!("netscape".parse::<ProfileManagerKind>().is_err());
    }
}
