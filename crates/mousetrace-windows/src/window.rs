//! Message-only windows that receive raw input.

use std::ops::ControlFlow;

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DestroyWindow, DispatchMessageW, GetMessageW, PeekMessageW,
    TranslateMessage, HMENU, HWND_MESSAGE, MSG, PM_REMOVE, WINDOW_EX_STYLE, WINDOW_STYLE,
    WM_INPUT,
};

use crate::rawinput::{read_input, RawInputError, RawMouseInput, Result};
use crate::timing::counter;

/// A hidden window owned by the thread that created it.
///
/// Uses the system `Message` class, so no window procedure is registered;
/// raw input is read straight from the thread's message queue.
#[derive(Debug)]
pub struct MessageWindow {
    hwnd: HWND,
}

impl MessageWindow {
    /// Create a message-only window on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created.
    pub fn create() -> Result<Self> {
        // SAFETY: all pointer arguments are null or static strings.
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("Message"),
                PCWSTR::null(),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                HMENU::default(),
                HINSTANCE::default(),
                None,
            )
        }
        .map_err(RawInputError::Window)?;
        Ok(Self { hwnd })
    }

    /// Window handle value, usable as a raw input target.
    #[must_use]
    pub fn id(&self) -> isize {
        self.hwnd.0 as isize
    }

    /// Run the calling thread's message loop, handing each raw input record
    /// to `on_input` with the counter value read when it was retrieved.
    ///
    /// Returns when `on_input` breaks or the queue receives `WM_QUIT`.
    ///
    /// # Errors
    ///
    /// Returns an error if message retrieval fails.
    pub fn pump<F>(&self, mut on_input: F) -> Result<()>
    where
        F: FnMut(RawMouseInput, i64) -> ControlFlow<()>,
    {
        let mut msg = MSG::default();
        loop {
            // SAFETY: `msg` is a valid out pointer.
            let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
            match status.0 {
                0 => return Ok(()),
                -1 => return Err(RawInputError::Message(windows::core::Error::from_win32())),
                _ => {}
            }

            let mut flow = ControlFlow::Continue(());
            if msg.message == WM_INPUT {
                let timestamp = counter();
                match read_input(msg.lParam.0) {
                    Ok(input) => flow = on_input(input, timestamp),
                    Err(e) => tracing::trace!(error = %e, "Skipping unreadable raw input"),
                }
            }

            // SAFETY: `msg` was filled by GetMessageW.
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            if flow.is_break() {
                return Ok(());
            }
        }
    }

    /// Dispatch every message already queued for the calling thread.
    pub fn discard_pending(&self) {
        let mut msg = MSG::default();
        // SAFETY: `msg` is a valid out pointer and is only dispatched after
        // PeekMessageW filled it.
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

impl Drop for MessageWindow {
    fn drop(&mut self) {
        // SAFETY: the window was created by this object and is destroyed once.
        if let Err(e) = unsafe { DestroyWindow(self.hwnd) } {
            tracing::debug!(error = %e, "Failed to destroy message window");
        }
    }
}
