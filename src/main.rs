//! Profile Autopilot
//!
//! Drives a UI-only browser profile manager (GoLogin, Incogniton) the way a
//! human would: launch it from its shortcut, read the screen via capture,
//! template matching and OCR, log in as the right account, navigate to the
//! target page, and perform and verify the configured action.

mod capture;
mod config;
mod credentials;
mod detect;
mod error;
mod exec;
mod input;
mod launch;
mod paths;
mod workflow;

use anyhow::{anyhow, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use config::AutomationConfig;
use launch::ProfileManagerKind;

const LOG_FILE: &str = "profile_autopilot.log";

/// Per-run session log path, set once at startup.
static SESSION_LOG: std::sync::OnceLock<PathBuf> = std::sync::OnceLock::new();

/// Logs a message to console, the main log file, and the per-run session
/// log, with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);

    let mut targets = vec![paths::get_logs_dir().join(LOG_FILE)];
    if let Some(session) = SESSION_LOG.get() {
        targets.push(session.clone());
    }
    for path in targets {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

struct CliArgs {
    config_path: PathBuf,
    credential_path: PathBuf,
    kind: ProfileManagerKind,
    pattern: Option<String>,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs {
        config_path: paths::get_exe_dir().join("config.json"),
        credential_path: paths::get_exe_dir().join("credentials.json"),
        kind: ProfileManagerKind::GoLogin,
        pattern: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .ok_or_else(|| anyhow!("{} requires a value", name))
        };
        match flag.as_str() {
            "--config" => args.config_path = PathBuf::from(value("--config")?),
            "--credentials" => args.credential_path = PathBuf::from(value("--credentials")?),
            "--manager" => {
                args.kind = value("--manager")?
                    .parse()
                    .map_err(|e: String| anyhow!(e))?
            }
            "--pattern" => args.pattern = Some(value("--pattern")?),
            "--help" | "-h" => {
                println!(
                    "usage: profile-autopilot [--config PATH] [--credentials PATH] \
                     [--manager gologin|incogniton|generic] [--pattern NAME]"
                );
                std::process::exit(0);
            }
            other => return Err(anyhow!("unknown argument: {}", other)),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        // Try to log even if paths module isn't initialized
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        if let Ok(Some(exe_dir)) =
            std::env::current_exe().map(|p| p.parent().map(|p| p.to_path_buf()))
        {
            let log_path = exe_dir.join("logs").join(LOG_FILE);
            if let Ok(mut file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                let _ = file.write_all(log_msg.as_bytes());
            }
        }
    }));

    paths::ensure_directories()?;
    let session_name = format!("run_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
    let _ = SESSION_LOG.set(paths::get_logs_dir().join(session_name));

    let args = parse_args()?;
    let config = AutomationConfig::load_or_default(&args.config_path);
    let credential = credentials::load_credential(&args.credential_path)?;
    let pattern = args
        .pattern
        .clone()
        .unwrap_or_else(|| args.kind.default_pattern().to_string());
    if pattern.is_empty() {
        return Err(anyhow!("--manager generic requires --pattern"));
    }

    log(&format!(
        "Starting: {} via \"{}\" for {}",
        match args.kind {
            ProfileManagerKind::GoLogin => "GoLogin",
            ProfileManagerKind::Incogniton => "Incogniton",
            ProfileManagerKind::GenericShortcut => "generic shortcut",
        },
        pattern,
        credential
    ));

    run(config, credential, args.kind, pattern)
}

#[cfg(windows)]
fn run(
    config: AutomationConfig,
    credential: credentials::Credential,
    kind: ProfileManagerKind,
    pattern: String,
) -> Result<()> {
    use workflow::{InputLease, WorkflowOrchestrator};

    let process_name = kind
        .process_name()
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("{}.exe", pattern));

    let lease = InputLease::new();
    let handle = workflow::spawn_run(&lease, move |progress, cancel| {
        // Graphics Capture is WinRT; the worker thread needs its own init.
        unsafe {
            if let Err(e) = windows::Win32::System::WinRT::RoInitialize(
                windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
            ) {
                log(&format!("RoInitialize failed: {}", e));
            }
        }

        let templates = detect::TemplateStore::load(&config.template_dir);
        let screen = capture::WindowCapture::new(&process_name);
        let input = input::SendInputDriver::new(&process_name);
        let ocr = detect::text::TesseractEngine::new();
        let probe = launch::WindowsProcessProbe;

        WorkflowOrchestrator::new(
            &screen,
            &input,
            &ocr,
            &probe,
            &templates,
            &config,
            &credential,
            kind,
            &pattern,
            cancel,
        )
        .with_progress(progress)
        .run()
    })?;

    // Steps already go to the log as they run; the channel is drained so a
    // future front end can watch the same events.
    for _event in handle.progress.iter() {}

    let report = handle.join();
    println!("{}", report);
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(not(windows))]
fn run(
    _config: AutomationConfig,
    _credential: credentials::Credential,
    _kind: ProfileManagerKind,
    _pattern: String,
) -> Result<()> {
    Err(anyhow!(
        "screen capture and input injection are Windows-only; this build can \
         only be used for configuration checks"
    ))
}
