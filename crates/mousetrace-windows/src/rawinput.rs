//! Raw input registration and decoding.

use std::mem::size_of;

use thiserror::Error;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::{
    GetRawInputBuffer, GetRawInputData, RegisterRawInputDevices, HRAWINPUT, RAWINPUT,
    RAWINPUTDEVICE, RAWINPUTDEVICE_FLAGS, RAWINPUTHEADER, RIDEV_INPUTSINK, RIDEV_REMOVE,
    RID_INPUT, RIM_TYPEKEYBOARD, RIM_TYPEMOUSE,
};

/// Generic desktop controls usage page.
const USAGE_PAGE_GENERIC: u16 = 0x01;

/// Mouse usage on the generic desktop page.
const USAGE_GENERIC_MOUSE: u16 = 0x02;

/// Errors raised by the raw input layer.
#[derive(Debug, Error)]
pub enum RawInputError {
    /// Registering the mouse for raw input failed.
    #[error("failed to register for raw mouse input: {0}")]
    Register(#[source] windows::core::Error),

    /// Removing the raw mouse input registration failed.
    #[error("failed to remove raw mouse input registration: {0}")]
    Unregister(#[source] windows::core::Error),

    /// A raw input record could not be read.
    #[error("failed to read raw input")]
    Read,

    /// The message-only window could not be created.
    #[error("failed to create message window: {0}")]
    Window(#[source] windows::core::Error),

    /// Retrieving a message from the thread queue failed.
    #[error("message retrieval failed: {0}")]
    Message(#[source] windows::core::Error),

    /// Waiting for input or the wake event failed.
    #[error("wait for raw input failed: {0}")]
    Wait(#[source] windows::core::Error),

    /// The wake event could not be created or signalled.
    #[error("wake event error: {0}")]
    Event(#[source] windows::core::Error),

    /// A scheduling priority change was refused.
    #[error("failed to change priority: {0}")]
    Priority(#[source] windows::core::Error),
}

/// Result type for raw input operations.
pub type Result<T> = std::result::Result<T, RawInputError>;

/// Device class of a raw input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Pointer device.
    Mouse,
    /// Keyboard.
    Keyboard,
    /// Other HID device.
    Hid,
}

/// The fields mousetrace needs from a raw input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMouseInput {
    /// Device class.
    pub kind: InputKind,
    /// Device handle value.
    pub device: u64,
    /// Relative horizontal motion.
    pub last_x: i32,
    /// Relative vertical motion.
    pub last_y: i32,
    /// Button transition flags.
    pub button_flags: u16,
}

impl RawMouseInput {
    fn from_raw(raw: &RAWINPUT) -> Self {
        let header = &raw.header;
        let kind = if header.dwType == RIM_TYPEMOUSE.0 {
            InputKind::Mouse
        } else if header.dwType == RIM_TYPEKEYBOARD.0 {
            InputKind::Keyboard
        } else {
            InputKind::Hid
        };
        let device = header.hDevice.0 as usize as u64;

        if kind != InputKind::Mouse {
            return Self {
                kind,
                device,
                last_x: 0,
                last_y: 0,
                button_flags: 0,
            };
        }

        // SAFETY: dwType says the union holds mouse data.
        let (last_x, last_y, button_flags) = unsafe {
            let mouse = &raw.data.mouse;
            (
                mouse.lLastX,
                mouse.lLastY,
                mouse.Anonymous.Anonymous.usButtonFlags,
            )
        };
        Self {
            kind,
            device,
            last_x,
            last_y,
            button_flags,
        }
    }
}

fn register(flags: RAWINPUTDEVICE_FLAGS, target: HWND) -> windows::core::Result<()> {
    let device = RAWINPUTDEVICE {
        usUsagePage: USAGE_PAGE_GENERIC,
        usUsage: USAGE_GENERIC_MOUSE,
        dwFlags: flags,
        hwndTarget: target,
    };
    // SAFETY: the slice holds one fully initialized device description.
    unsafe { RegisterRawInputDevices(&[device], size_of::<RAWINPUTDEVICE>() as u32) }
}

/// Deliver raw mouse input to the window `target`, even when it is not
/// in the foreground.
///
/// # Errors
///
/// Returns an error if the system refuses the registration.
pub fn register_mouse(target: isize) -> Result<()> {
    register(RIDEV_INPUTSINK, HWND(target as _)).map_err(RawInputError::Register)?;
    tracing::debug!(target, "Raw mouse input registered");
    Ok(())
}

/// Stop raw mouse input delivery for the process.
///
/// # Errors
///
/// Returns an error if the system refuses the removal.
pub fn unregister_mouse() -> Result<()> {
    register(RIDEV_REMOVE, HWND::default()).map_err(RawInputError::Unregister)
}

/// Read the record referenced by a `WM_INPUT` message's `lParam`.
///
/// # Errors
///
/// Returns [`RawInputError::Read`] if the record cannot be copied.
pub fn read_input(lparam: isize) -> Result<RawMouseInput> {
    let mut raw = RAWINPUT::default();
    let mut size = size_of::<RAWINPUT>() as u32;
    // SAFETY: `raw` is a writable RAWINPUT and `size` reports its length.
    let copied = unsafe {
        GetRawInputData(
            HRAWINPUT(lparam as _),
            RID_INPUT,
            Some((&mut raw as *mut RAWINPUT).cast()),
            &mut size,
            size_of::<RAWINPUTHEADER>() as u32,
        )
    };
    if copied == u32::MAX || copied == 0 {
        return Err(RawInputError::Read);
    }
    Ok(RawMouseInput::from_raw(&raw))
}

/// A fixed-size buffer for batched raw input reads.
#[derive(Debug)]
pub struct RawInputBuffer {
    slots: Vec<RAWINPUT>,
}

impl RawInputBuffer {
    /// Allocate room for `slots` records.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            slots: vec![RAWINPUT::default(); slots.max(1)],
        }
    }

    /// Move pending raw input records of the calling thread into `out`.
    ///
    /// Returns the number of records read, zero when none were pending.
    ///
    /// # Errors
    ///
    /// Returns [`RawInputError::Read`] if the system reports a failure.
    pub fn drain(&mut self, out: &mut Vec<RawMouseInput>) -> Result<usize> {
        let mut size = (self.slots.len() * size_of::<RAWINPUT>()) as u32;
        let base = self.slots.as_mut_ptr();
        // SAFETY: `base` points at `size` writable bytes.
        let count = unsafe {
            GetRawInputBuffer(Some(base), &mut size, size_of::<RAWINPUTHEADER>() as u32)
        };
        if count == u32::MAX {
            return Err(RawInputError::Read);
        }

        let end = base as usize + self.slots.len() * size_of::<RAWINPUT>();
        let mut current = base as usize;
        for _ in 0..count {
            if current + size_of::<RAWINPUTHEADER>() > end {
                break;
            }
            // SAFETY: the system wrote `count` records starting at `base`,
            // each 8-byte aligned and prefixed by its header.
            let raw = unsafe { &*(current as *const RAWINPUT) };
            out.push(RawMouseInput::from_raw(raw));
            current = (current + raw.header.dwSize as usize + 7) & !7;
        }
        Ok(count as usize)
    }
}
