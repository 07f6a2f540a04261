//! Platform selection.
//!
//! Raw pointer capture is only implemented on Windows; other platforms can
//! still run the scripted pipeline.

#[cfg(target_os = "windows")]
pub mod windows;

/// Name of the platform this build targets.
#[must_use]
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        mousetrace_windows::platform_name()
    }
    #[cfg(target_os = "linux")]
    {
        "Linux"
    }
    #[cfg(target_os = "macos")]
    {
        "macOS"
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        std::env::consts::OS
    }
}

/// Whether live capture from a pointer device is available.
#[must_use]
pub fn capture_supported() -> bool {
    cfg!(target_os = "windows")
}

/// Resolution of the tick counter live captures are stamped with, or
/// `None` where live capture is unavailable.
#[must_use]
pub fn ticks_per_second() -> Option<i64> {
    #[cfg(target_os = "windows")]
    {
        Some(mousetrace_windows::frequency())
    }
    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}
