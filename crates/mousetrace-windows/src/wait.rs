//! Blocking until raw input arrives or another thread asks to wake.

use std::sync::Arc;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE, WAIT_FAILED};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, INFINITE};
use windows::Win32::UI::WindowsAndMessaging::{
    MsgWaitForMultipleObjectsEx, MWMO_INPUTAVAILABLE, QS_RAWINPUT,
};

use crate::rawinput::{RawInputError, Result};

#[derive(Debug)]
struct OwnedEvent(HANDLE);

// SAFETY: event handles may be signalled and waited on from any thread.
unsafe impl Send for OwnedEvent {}
// SAFETY: see above.
unsafe impl Sync for OwnedEvent {}

impl Drop for OwnedEvent {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed exactly once.
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// A manual-reset event that interrupts a raw input wait.
#[derive(Debug, Clone)]
pub struct WakeEvent {
    event: Arc<OwnedEvent>,
}

impl WakeEvent {
    /// Create an unsignalled event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be created.
    pub fn new() -> Result<Self> {
        // SAFETY: an anonymous event with default security.
        let handle = unsafe { CreateEventW(None, BOOL::from(true), BOOL::from(false), PCWSTR::null()) }
            .map_err(RawInputError::Event)?;
        Ok(Self {
            event: Arc::new(OwnedEvent(handle)),
        })
    }

    /// Signal the event. It stays set for the rest of its life.
    pub fn set(&self) {
        // SAFETY: the handle is alive while `self` is.
        if let Err(e) = unsafe { SetEvent(self.event.0) } {
            tracing::warn!(error = %e, "Failed to signal wake event");
        }
    }

    /// Block until raw input is pending for the calling thread or the event
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait itself fails.
    pub fn wait_for_input(&self) -> Result<()> {
        let handles = [self.event.0];
        // SAFETY: `handles` holds one live event handle.
        let status = unsafe {
            MsgWaitForMultipleObjectsEx(Some(&handles), INFINITE, QS_RAWINPUT, MWMO_INPUTAVAILABLE)
        };
        if status == WAIT_FAILED {
            return Err(RawInputError::Wait(windows::core::Error::from_win32()));
        }
        Ok(())
    }
}
