//! Hardware-level input injection via `SendInput`.
//!
//! Window messages (`PostMessage`) are not reliable against Electron-based
//! profile managers; hardware-level events are, at the cost of moving the
//! real cursor. The target window is re-focused before every action since
//! the user may have clicked elsewhere mid-run.

use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT, VIRTUAL_KEY, VK_CONTROL, VK_DELETE,
    VK_MENU, VK_RETURN, VK_SHIFT, VK_TAB,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SetForegroundWindow, SM_CXSCREEN, SM_CYSCREEN,
};

use super::{InputDriver, Key};
use crate::capture::window::find_window_by_process;
use crate::detect::Point;
use crate::error::{AutomationError, Result};

const KEY_DELAY_MS: u64 = 20;
const FOCUS_DELAY_MS: u64 = 50;

pub struct SendInputDriver {
    process_name: String,
}

impl SendInputDriver {
    pub fn new(process_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
        }
    }

    fn focus_target(&self) -> Result<windows::Win32::Foundation::HWND> {
        let hwnd = find_window_by_process(&self.process_name)
            .map_err(|e| AutomationError::Input(e.to_string()))?;
        unsafe {
            let _ = SetForegroundWindow(hwnd);
        }
        std::thread::sleep(std::time::Duration::from_millis(FOCUS_DELAY_MS));
        Ok(hwnd)
    }
}

impl InputDriver for SendInputDriver {
    fn click(&self, point: Point) -> Result<()> {
        let hwnd = self.focus_target()?;

        // Detection coordinates are client-relative; convert to screen.
        let mut screen_point = POINT {
            x: point.x,
            y: point.y,
        };
        unsafe {
            if !ClientToScreen(hwnd, &mut screen_point).as_bool() {
                return Err(AutomationError::Input("ClientToScreen failed".into()));
            }
        }

        let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        if screen_width <= 0 || screen_height <= 0 {
            return Err(AutomationError::Input("no screen metrics".into()));
        }

        // MOUSEEVENTF_ABSOLUTE requires 0-65535 normalized coordinates.
        let norm_x = ((screen_point.x as i64 * 65535) / screen_width as i64) as i32;
        let norm_y = ((screen_point.y as i64 * 65535) / screen_height as i64) as i32;

        let mouse_event = |flags| INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: norm_x,
                    dy: norm_y,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        };

        unsafe {
            send(&[mouse_event(MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE)])?;
            std::thread::sleep(std::time::Duration::from_millis(KEY_DELAY_MS));
            send(&[mouse_event(
                MOUSEEVENTF_LEFTDOWN | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
            )])?;
            std::thread::sleep(std::time::Duration::from_millis(KEY_DELAY_MS));
            send(&[mouse_event(
                MOUSEEVENTF_LEFTUP | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
            )])?;
        }
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.focus_target()?;
        for unit in text.encode_utf16() {
            unsafe {
                send(&[unicode_key(unit, false), unicode_key(unit, true)])?;
            }
            std::thread::sleep(std::time::Duration::from_millis(KEY_DELAY_MS));
        }
        Ok(())
    }

    fn key_combo(&self, keys: &[Key]) -> Result<()> {
        self.focus_target()?;

        let vks: Vec<VIRTUAL_KEY> = keys.iter().map(virtual_key).collect();
        unsafe {
            for vk in &vks {
                send(&[vk_key(*vk, false)])?;
                std::thread::sleep(std::time::Duration::from_millis(KEY_DELAY_MS));
            }
            for vk in vks.iter().rev() {
                send(&[vk_key(*vk, true)])?;
                std::thread::sleep(std::time::Duration::from_millis(KEY_DELAY_MS));
            }
        }
        Ok(())
    }
}

fn virtual_key(key: &Key) -> VIRTUAL_KEY {
    match key {
        Key::Ctrl => VK_CONTROL,
        Key::Shift => VK_SHIFT,
        Key::Alt => VK_MENU,
        Key::Enter => VK_RETURN,
        Key::Tab => VK_TAB,
        Key::Delete => VK_DELETE,
        // Letter and digit virtual-key codes equal their uppercase ASCII.
        Key::Char(c) => VIRTUAL_KEY(c.to_ascii_uppercase() as u16),
    }
}

fn vk_key(vk: VIRTUAL_KEY, up: bool) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                dwFlags: if up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) },
                ..Default::default()
            },
        },
    }
}

fn unicode_key(unit: u16, up: bool) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wScan: unit,
                dwFlags: if up {
                    KEYEVENTF_UNICODE | KEYEVENTF_KEYUP
                } else {
                    KEYEVENTF_UNICODE
                },
                ..Default::default()
            },
        },
    }
}

unsafe fn send(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(AutomationError::Input(format!(
            "SendInput injected {} of {} events",
            sent,
            inputs.len()
        )));
    }
    Ok(())
}
