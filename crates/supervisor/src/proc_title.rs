// SPDX-License-Identifier: MIT

//! Process title support.

/// Set the process title shown by `ps`/`top`.
///
/// Linux truncates to 15 bytes (`PR_SET_NAME`); other platforms are a
/// no-op. Best-effort: a failure never affects supervision.
#[cfg(target_os = "linux")]
pub fn set_process_title(title: &str) {
    let truncated: String = title.chars().take(15).collect();
    if let Ok(name) = std::ffi::CString::new(truncated) {
        let _ = nix::sys::prctl::set_name(&name);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(_title: &str) {}
