use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the template store directory: `<exe_dir>/templates/`
///
/// Adding a new UI target means dropping a new reference PNG in here;
/// no code change is required.
pub fn get_template_dir() -> PathBuf {
    get_exe_dir().join("templates")
}

/// Returns the default directory searched for launchable shortcuts.
///
/// On Windows this is the user's desktop, where profile managers install
/// their shortcuts. Elsewhere it falls back to the exe directory so dry
/// runs have a sane path.
pub fn default_shortcut_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(profile) = std::env::var("USERPROFILE") {
            return PathBuf::from(profile).join("Desktop");
        }
    }
    get_exe_dir().clone()
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_template_dir())?;
    Ok(())
}
