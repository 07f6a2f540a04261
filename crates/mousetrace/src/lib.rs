//! `mousetrace` - High-resolution raw pointer capture
//!
//! This library records unaccelerated mouse counts between a press and a
//! release of a trigger button, timestamps them with the platform's
//! monotonic counter and exports the result for sensor analysis.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod platform;
pub mod recorder;
pub mod sample;
pub mod session;
pub mod signal;
pub mod source;

pub use buffer::SampleBuffer;
pub use config::{CaptureConfig, Config, ExportConfig};
pub use error::{Error, Notice, Result};
pub use export::{CsvSink, ExportFormat, ExportMetadata, ExportSink, FileExporter, JsonSink};
pub use logging::init_logging;
pub use normalize::{normalize, RawEvent, RawEventKind};
pub use recorder::Recorder;
pub use sample::{ButtonFlags, DeviceHandle, MotionSample, Ticks, TriggerButton};
pub use session::{CaptureSession, Dispatch, RecordingState, SourceKind};
pub use signal::StopSignal;
pub use source::{AcquisitionSource, ContextId, InputBackend, RawInputQueue, ScriptedBackend};
