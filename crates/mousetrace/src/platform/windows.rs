//! Win32 raw input backend.

use std::ops::ControlFlow;

use mousetrace_windows::{
    self as win, InputKind, MessageWindow, RawInputBuffer, RawInputError, RawMouseInput, WakeEvent,
};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::normalize::{RawEvent, RawEventKind};
use crate::recorder::Recorder;
use crate::sample::{ButtonFlags, DeviceHandle, Ticks};
use crate::session::SourceKind;
use crate::signal::StopSignal;
use crate::source::{ContextId, InputBackend, RawInputQueue};

impl From<RawInputError> for Error {
    fn from(err: RawInputError) -> Self {
        Self::Platform(err.to_string())
    }
}

fn to_raw_event(input: &RawMouseInput) -> RawEvent {
    let kind = match input.kind {
        InputKind::Mouse => RawEventKind::Mouse,
        InputKind::Keyboard => RawEventKind::Keyboard,
        InputKind::Hid => RawEventKind::Hid,
    };
    RawEvent {
        kind,
        device: DeviceHandle(input.device),
        last_x: input.last_x,
        last_y: input.last_y,
        buttons: ButtonFlags(input.button_flags),
    }
}

/// Raw input through `RegisterRawInputDevices` and `GetRawInputBuffer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsBackend;

impl InputBackend for WindowsBackend {
    type Queue = WindowsQueue;

    fn name(&self) -> &'static str {
        "win32-raw-input"
    }

    fn register_passive(&self, context: ContextId) -> Result<()> {
        Ok(win::register_mouse(context.0)?)
    }

    fn unregister(&self, _context: ContextId) -> Result<()> {
        Ok(win::unregister_mouse()?)
    }

    fn open_queue(&self, batch_size: usize) -> Result<WindowsQueue> {
        WindowsQueue::open(batch_size)
    }

    fn elevate_current_thread(&self) -> Result<()> {
        Ok(win::elevate_current_thread()?)
    }

    fn now(&self) -> Ticks {
        Ticks(win::counter())
    }

    fn ticks_per_second(&self) -> i64 {
        win::frequency()
    }
}

/// A message-only window on the polling thread with raw mouse input
/// routed to it.
#[derive(Debug)]
pub struct WindowsQueue {
    window: MessageWindow,
    buffer: RawInputBuffer,
    wake: WakeEvent,
    scratch: Vec<RawMouseInput>,
    waker_installed: bool,
}

impl WindowsQueue {
    fn open(batch_size: usize) -> Result<Self> {
        Self::open_with(batch_size, WakeEvent::new, win::register_mouse)
    }

    // Registration comes last: once it succeeds, Drop owns the removal.
    fn open_with(
        batch_size: usize,
        make_wake: impl FnOnce() -> win::Result<WakeEvent>,
        register: impl FnOnce(isize) -> win::Result<()>,
    ) -> Result<Self> {
        let window = MessageWindow::create()?;
        let wake = make_wake()?;
        register(window.id())?;
        Ok(Self {
            window,
            buffer: RawInputBuffer::new(batch_size),
            wake,
            scratch: Vec::with_capacity(batch_size),
            waker_installed: false,
        })
    }
}

impl RawInputQueue for WindowsQueue {
    fn wait(&mut self, stop: &StopSignal) -> Result<()> {
        if !self.waker_installed {
            let wake = self.wake.clone();
            stop.set_waker(move || wake.set());
            self.waker_installed = true;
        }
        if stop.is_set() {
            return Ok(());
        }
        self.wake.wait_for_input()?;
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<RawEvent>) -> Result<()> {
        self.scratch.clear();
        if self.buffer.drain(&mut self.scratch)? == 0 {
            // Input flagged by the wait may be a non-raw message; clear it
            // so the next wait blocks.
            self.window.discard_pending();
        }
        out.extend(self.scratch.iter().map(to_raw_event));
        Ok(())
    }

    fn now(&self) -> Ticks {
        Ticks(win::counter())
    }
}

impl Drop for WindowsQueue {
    fn drop(&mut self) {
        if let Err(e) = win::unregister_mouse() {
            debug!(error = %e, "Failed to remove poller registration");
        }
    }
}

/// Arm a capture fed by `mode` and block until the trigger is released.
///
/// Passive captures pump the calling thread's message queue; poller
/// captures wait for the polling thread to exit.
///
/// # Errors
///
/// Returns an error if the capture cannot start or ends with a failure.
pub fn run_capture(config: &CaptureConfig, mode: SourceKind) -> Result<Recorder<WindowsBackend>> {
    if config.raise_process_priority {
        if let Err(e) = win::raise_process_priority() {
            warn!(error = %e, "Failed to raise process priority");
        }
    }

    let window = MessageWindow::create()?;
    let mut recorder =
        Recorder::new(WindowsBackend, config).with_passive_context(ContextId(window.id()));
    recorder.start_capture(mode)?;
    info!(
        trigger = %config.trigger_button,
        "Press the trigger button anywhere to begin; the capture ends on release"
    );

    match mode {
        SourceKind::Passive => run_passive(&window, &mut recorder)?,
        SourceKind::ActivePoller => recorder.wait_for_completion()?,
    }
    Ok(recorder)
}

/// Feed raw input delivered to `window` into a live passive capture until
/// its recording ends.
///
/// # Errors
///
/// Returns an error if the message loop fails.
pub fn run_passive(window: &MessageWindow, recorder: &mut Recorder<WindowsBackend>) -> Result<()> {
    window.pump(|input, timestamp| {
        match recorder.dispatch_passive_at(&to_raw_event(&input), Ticks(timestamp)) {
            Some(dispatch) if !dispatch.stopped => ControlFlow::Continue(()),
            _ => ControlFlow::Break(()),
        }
    })?;
    recorder.wait_for_completion()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_event() {
        let input = RawMouseInput {
            kind: InputKind::Mouse,
            device: 42,
            last_x: -3,
            last_y: 7,
            button_flags: 0x0001,
        };
        let raw = to_raw_event(&input);
        assert_eq!(raw.kind, RawEventKind::Mouse);
        assert_eq!(raw.device, DeviceHandle(42));
        assert_eq!((raw.last_x, raw.last_y), (-3, 7));
        assert_eq!(raw.buttons, ButtonFlags::LEFT_DOWN);
    }

    #[test]
    fn test_keyboard_kind_maps() {
        let input = RawMouseInput {
            kind: InputKind::Keyboard,
            device: 1,
            last_x: 0,
            last_y: 0,
            button_flags: 0,
        };
        assert_eq!(to_raw_event(&input).kind, RawEventKind::Keyboard);
    }

    #[test]
    fn test_backend_clock() {
        let backend = WindowsBackend;
        assert!(backend.ticks_per_second() > 0);
        assert!(backend.now() <= backend.now());
    }

    #[test]
    fn test_wake_failure_skips_registration() {
        let registered = std::cell::Cell::new(false);
        let result = WindowsQueue::open_with(
            4,
            || Err(RawInputError::Read),
            |_| {
                registered.set(true);
                Ok(())
            },
        );
        assert!(matches!(result, Err(Error::Platform(_))));
        assert!(!registered.get());
    }

    #[test]
    fn test_registration_failure_reported() {
        let result = WindowsQueue::open_with(4, WakeEvent::new, |_| Err(RawInputError::Read));
        assert!(result.is_err());
    }
}
