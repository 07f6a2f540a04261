//! Core sample types for mousetrace.
//!
//! This module defines the normalized record produced for every raw pointer
//! event, together with the small value types it is built from.

use std::fmt;
use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// A reading of the monotonic tick counter.
///
/// The tick rate is platform dependent and reported separately by the
/// acquisition backend (see [`crate::source::InputBackend::ticks_per_second`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticks(pub i64);

impl Sub for Ticks {
    type Output = i64;

    fn sub(self, rhs: Self) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque identifier of the physical device an event originated from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHandle(pub u64);

/// Button transitions co-reported with a raw pointer event.
///
/// Uses the raw-input bit layout so platform values can be carried verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonFlags(pub u16);

impl ButtonFlags {
    /// No transitions.
    pub const NONE: Self = Self(0);
    /// Left button pressed.
    pub const LEFT_DOWN: Self = Self(0x0001);
    /// Left button released.
    pub const LEFT_UP: Self = Self(0x0002);
    /// Right button pressed.
    pub const RIGHT_DOWN: Self = Self(0x0004);
    /// Right button released.
    pub const RIGHT_UP: Self = Self(0x0008);
    /// Middle button pressed.
    pub const MIDDLE_DOWN: Self = Self(0x0010);
    /// Middle button released.
    pub const MIDDLE_UP: Self = Self(0x0020);
    /// Fourth button pressed.
    pub const BUTTON4_DOWN: Self = Self(0x0040);
    /// Fourth button released.
    pub const BUTTON4_UP: Self = Self(0x0080);
    /// Fifth button pressed.
    pub const BUTTON5_DOWN: Self = Self(0x0100);
    /// Fifth button released.
    pub const BUTTON5_UP: Self = Self(0x0200);
    /// Vertical wheel movement.
    pub const WHEEL: Self = Self(0x0400);
    /// Horizontal wheel movement.
    pub const HWHEEL: Self = Self(0x0800);

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Bitwise union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ButtonFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// The physical button whose edges start and stop a recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerButton {
    /// Primary button.
    #[default]
    Left,
    /// Secondary button.
    Right,
    /// Wheel button.
    Middle,
    /// First side button.
    Button4,
    /// Second side button.
    Button5,
}

impl TriggerButton {
    /// Flag reported when this button is pressed.
    #[must_use]
    pub const fn down(self) -> ButtonFlags {
        match self {
            Self::Left => ButtonFlags::LEFT_DOWN,
            Self::Right => ButtonFlags::RIGHT_DOWN,
            Self::Middle => ButtonFlags::MIDDLE_DOWN,
            Self::Button4 => ButtonFlags::BUTTON4_DOWN,
            Self::Button5 => ButtonFlags::BUTTON5_DOWN,
        }
    }

    /// Flag reported when this button is released.
    #[must_use]
    pub const fn up(self) -> ButtonFlags {
        match self {
            Self::Left => ButtonFlags::LEFT_UP,
            Self::Right => ButtonFlags::RIGHT_UP,
            Self::Middle => ButtonFlags::MIDDLE_UP,
            Self::Button4 => ButtonFlags::BUTTON4_UP,
            Self::Button5 => ButtonFlags::BUTTON5_UP,
        }
    }
}

impl fmt::Display for TriggerButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Middle => write!(f, "middle"),
            Self::Button4 => write!(f, "button4"),
            Self::Button5 => write!(f, "button5"),
        }
    }
}

/// One normalized pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Relative horizontal motion in device counts.
    pub delta_x: i32,
    /// Relative vertical motion in device counts (device convention, down is positive).
    pub delta_y: i32,
    /// Tick count at acquisition.
    pub timestamp: Ticks,
    /// Originating device.
    pub device: DeviceHandle,
    /// Button transitions reported with this event.
    pub buttons: ButtonFlags,
}
