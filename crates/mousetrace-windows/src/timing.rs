//! Performance counter access.

use std::sync::OnceLock;

use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};

/// Current performance counter value.
#[must_use]
pub fn counter() -> i64 {
    let mut value = 0;
    // SAFETY: `value` is a valid out pointer. The call cannot fail on
    // supported Windows versions.
    let _ = unsafe { QueryPerformanceCounter(&mut value) };
    value
}

/// Performance counter ticks per second, fixed at boot.
#[must_use]
pub fn frequency() -> i64 {
    static FREQUENCY: OnceLock<i64> = OnceLock::new();
    *FREQUENCY.get_or_init(|| {
        let mut value = 0;
        // SAFETY: `value` is a valid out pointer.
        let _ = unsafe { QueryPerformanceFrequency(&mut value) };
        value.max(1)
    })
}
