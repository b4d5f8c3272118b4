//! Windows process enumeration and shortcut spawning.

use std::path::Path;

use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};

use super::ProcessProbe;
use crate::error::{AutomationError, Result};

pub struct WindowsProcessProbe;

impl ProcessProbe for WindowsProcessProbe {
    fn is_process_running(&self, process_name: &str) -> bool {
        let target = process_name.to_lowercase();
        unsafe {
            let Ok(snapshot) = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) else {
                return false;
            };

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut found = false;
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let len = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    let name = String::from_utf16_lossy(&entry.szExeFile[..len]);
                    if name.to_lowercase() == target {
                        found = true;
                        break;
                    }
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
            found
        }
    }

    fn spawn_shortcut(&self, path: &Path) -> Result<()> {
        // .lnk files are not executables; let the shell resolve them.
        std::process::Command::new("cmd")
            .args(["/C", "start", ""])
            .arg(path)
            .spawn()
            .map_err(|e| {
                AutomationError::Input(format!("failed to invoke {}: {}", path.display(), e))
            })?;
        Ok(())
    }
}
