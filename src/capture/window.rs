//! Window discovery by owning process name.

use anyhow::{anyhow, Result};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindowVisible,
};

/// Finds the main window of the process with the given executable name
/// (case-insensitive, e.g. "gologin.exe") by enumerating visible windows.
pub fn find_window_by_process(process_name: &str) -> Result<HWND> {
    struct EnumData {
        target: String,
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }

            // Windows without a title are usually not main windows.
            let title_len = GetWindowTextLengthW(hwnd);
            if title_len == 0 {
                return TRUE;
            }
            let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
            GetWindowTextW(hwnd, &mut title_buf);

            let mut process_id: u32 = 0;
            GetWindowThreadProcessId(hwnd, Some(&mut process_id));
            if process_id == 0 {
                return TRUE;
            }

            let Ok(process_handle) =
                OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id)
            else {
                return TRUE;
            };

            let mut name_buf: Vec<u16> = vec![0; 1024];
            let mut len = name_buf.len() as u32;
            let result = QueryFullProcessImageNameW(
                process_handle,
                PROCESS_NAME_WIN32,
                windows::core::PWSTR(name_buf.as_mut_ptr()),
                &mut len,
            );
            let _ = windows::Win32::Foundation::CloseHandle(process_handle);

            if result.is_err() || len == 0 {
                return TRUE;
            }

            let full_path = OsString::from_wide(&name_buf[..len as usize])
                .to_string_lossy()
                .to_string();
            let exe_name = full_path
                .rsplit('\\')
                .next()
                .unwrap_or(&full_path)
                .to_lowercase();

            if exe_name == data.target {
                data.hwnd = Some(hwnd);
                return BOOL(0); // Stop enumeration
            }

            TRUE
        }
    }

    let mut data = EnumData {
        target: process_name.to_lowercase(),
        hwnd: None,
    };
    unsafe {
        // EnumWindows returns FALSE when the callback stops it early, which
        // is the found case, not an error.
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }

    data.hwnd
        .ok_or_else(|| anyhow!("no visible window owned by {}", process_name))
}

/// Gets the client area rectangle and its offset relative to the window
/// origin, needed to crop captured frames to the drawable area.
pub fn get_client_area_info(hwnd: HWND) -> Result<(RECT, POINT)> {
    let mut client_rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client_rect)? };

    let mut client_origin = POINT { x: 0, y: 0 };
    unsafe {
        if !ClientToScreen(hwnd, &mut client_origin).as_bool() {
            return Err(anyhow!("ClientToScreen failed"));
        }
    }

    let mut window_rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut window_rect)? };

    let offset = POINT {
        x: client_origin.x - window_rect.left,
        y: client_origin.y - window_rect.top,
    };

    Ok((client_rect, offset))
}
