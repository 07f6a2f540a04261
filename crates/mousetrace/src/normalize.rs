//! Raw event normalization.
//!
//! Platform layers translate whatever the operating system delivers into a
//! [`RawEvent`]; this module turns those into [`MotionSample`]s.

use serde::{Deserialize, Serialize};

use crate::sample::{ButtonFlags, DeviceHandle, MotionSample, Ticks};

/// The device class a raw event was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    /// Pointer device.
    Mouse,
    /// Keyboard.
    Keyboard,
    /// Any other HID device.
    Hid,
}

/// A platform-neutral raw input event, prior to any acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Device class.
    pub kind: RawEventKind,
    /// Originating device.
    pub device: DeviceHandle,
    /// Relative horizontal motion.
    pub last_x: i32,
    /// Relative vertical motion.
    pub last_y: i32,
    /// Button transition bits.
    pub buttons: ButtonFlags,
}

impl RawEvent {
    /// A mouse motion event without button transitions.
    #[must_use]
    pub fn motion(device: DeviceHandle, last_x: i32, last_y: i32) -> Self {
        Self {
            kind: RawEventKind::Mouse,
            device,
            last_x,
            last_y,
            buttons: ButtonFlags::NONE,
        }
    }

    /// A mouse event carrying only button transitions.
    #[must_use]
    pub fn buttons(device: DeviceHandle, buttons: ButtonFlags) -> Self {
        Self {
            kind: RawEventKind::Mouse,
            device,
            last_x: 0,
            last_y: 0,
            buttons,
        }
    }

    /// A keyboard event, which normalization always ignores.
    #[must_use]
    pub fn keyboard(device: DeviceHandle) -> Self {
        Self {
            kind: RawEventKind::Keyboard,
            device,
            last_x: 0,
            last_y: 0,
            buttons: ButtonFlags::NONE,
        }
    }
}

/// Convert a raw event into a sample stamped with `timestamp`.
///
/// Returns `None` for anything that is not a mouse event.
#[must_use]
pub fn normalize(raw: &RawEvent, timestamp: Ticks) -> Option<MotionSample> {
    if raw.kind != RawEventKind::Mouse {
        return None;
    }

    Some(MotionSample {
        delta_x: raw.last_x,
        delta_y: raw.last_y,
        timestamp,
        device: raw.device,
        buttons: raw.buttons,
    })
}
