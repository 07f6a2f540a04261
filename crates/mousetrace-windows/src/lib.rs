//! Windows-specific implementation for mousetrace.
//!
//! This crate wraps the Win32 raw input facilities mousetrace captures from:
//! raw input registration, message-only windows, batched buffer reads,
//! the performance counter and scheduling priority.

#![cfg(target_os = "windows")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(unsafe_code)]

pub mod priority;
pub mod rawinput;
pub mod timing;
pub mod wait;
pub mod window;

pub use priority::{elevate_current_thread, raise_process_priority};
pub use rawinput::{
    read_input, register_mouse, unregister_mouse, InputKind, RawInputBuffer, RawInputError,
    RawMouseInput, Result,
};
pub use timing::{counter, frequency};
pub use wait::WakeEvent;
pub use window::MessageWindow;

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "Windows"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "Windows");
    }
}
