//! Scheduling priority.

use windows::Win32::System::Threading::{
    GetCurrentProcess, GetCurrentThread, SetPriorityClass, SetThreadPriority,
    ABOVE_NORMAL_PRIORITY_CLASS, THREAD_PRIORITY_TIME_CRITICAL,
};

use crate::rawinput::{RawInputError, Result};

/// Run the calling thread at time-critical priority.
///
/// # Errors
///
/// Returns an error if the system refuses the change.
pub fn elevate_current_thread() -> Result<()> {
    // SAFETY: the pseudo handle always refers to the calling thread.
    unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) }
        .map_err(RawInputError::Priority)
}

/// Run the whole process above normal priority.
///
/// # Errors
///
/// Returns an error if the system refuses the change.
pub fn raise_process_priority() -> Result<()> {
    // SAFETY: the pseudo handle always refers to the calling process.
    unsafe { SetPriorityClass(GetCurrentProcess(), ABOVE_NORMAL_PRIORITY_CLASS) }
        .map_err(RawInputError::Priority)
}
