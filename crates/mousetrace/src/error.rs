//! Error types for mousetrace.
//!
//! Every failure is handled at the boundary where it occurs and surfaced to
//! the user once, through [`Error::notice`]. Samples lost to a failed buffer
//! growth are not errors; they are counted by the buffer instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::RecordingState;

/// The main error type for mousetrace operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Capture Errors ===
    /// The dedicated poller thread could not be created.
    #[error("failed to create the capture thread: {source}")]
    ThreadSpawn {
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An acquisition source is still delivering events.
    #[error("a capture is already in progress")]
    CaptureInProgress,

    /// The recording state machine rejected a request.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The state the session was in.
        state: RecordingState,
        /// What was attempted.
        action: &'static str,
    },

    /// An acquisition source failed to start.
    #[error("failed to activate acquisition source '{name}': {message}")]
    SourceActivate {
        /// Name of the acquisition source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Export Errors ===
    /// Required session metadata was not supplied.
    #[error("missing export metadata: {field}")]
    MissingMetadata {
        /// The missing field.
        field: &'static str,
    },

    /// The export destination could not be opened for writing.
    #[error("failed to open export destination {path}: {source}")]
    ExportOpen {
        /// Destination path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Platform Errors ===
    /// Platform-specific operation failed.
    #[error("platform error: {0}")]
    Platform(String),

    /// The operation is not available on this platform.
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    // === I/O Errors ===
    /// File system or stream operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for mousetrace operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// A user-facing message derived from an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Short title.
    pub title: &'static str,
    /// Message body.
    pub message: String,
}

impl Error {
    /// Create a new platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a new unsupported-operation error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a source activation error.
    #[must_use]
    pub fn source_activate(name: &'static str, message: impl Into<String>) -> Self {
        Self::SourceActivate {
            name,
            message: message.into(),
        }
    }

    /// Check if this error means a capture is still running.
    #[must_use]
    pub fn is_capture_in_progress(&self) -> bool {
        matches!(self, Self::CaptureInProgress)
    }

    /// Check if this error is caused by missing metadata.
    #[must_use]
    pub fn is_missing_metadata(&self) -> bool {
        matches!(self, Self::MissingMetadata { .. })
    }

    /// The single notice shown to the user for this error.
    #[must_use]
    pub fn notice(&self) -> Notice {
        let title = match self {
            Self::ThreadSpawn { .. } => "CreateThread Fail",
            Self::MissingMetadata { field } if *field == "cpi" => "No CPI Set",
            Self::MissingMetadata { .. } => "Missing Metadata",
            Self::ExportOpen { .. } | Self::Io(_) | Self::Json(_) => "Data Save Failed",
            Self::CaptureInProgress | Self::InvalidTransition { .. } => "Capture Busy",
            Self::SourceActivate { .. } | Self::Platform(_) | Self::Unsupported(_) => {
                "Capture Failed"
            }
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        };
        let message = match self {
            Self::MissingMetadata { field } if *field == "cpi" => {
                "Please set your mouse CPI and re-export".to_string()
            }
            Self::ExportOpen { .. } => "Failed to open output file".to_string(),
            Self::ThreadSpawn { .. } => "Failed to create the capture thread.".to_string(),
            other => other.to_string(),
        };
        Notice { title, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CaptureInProgress;
        assert_eq!(err.to_string(), "a capture is already in progress");

        let err = Error::platform("test error");
        assert_eq!(err.to_string(), "platform error: test error");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            state: RecordingState::Recording,
            action: "arm",
        };
        assert_eq!(err.to_string(), "cannot arm while recording");
    }

    #[test]
    fn test_is_capture_in_progress() {
        assert!(Error::CaptureInProgress.is_capture_in_progress());
        assert!(!Error::internal("x").is_capture_in_progress());
    }

    #[test]
    fn test_is_missing_metadata() {
        assert!(Error::MissingMetadata { field: "cpi" }.is_missing_metadata());
        assert!(!Error::CaptureInProgress.is_missing_metadata());
    }

    #[test]
    fn test_thread_spawn_notice() {
        let err = Error::ThreadSpawn {
            source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads"),
        };
        let notice = err.notice();
        assert_eq!(notice.title, "CreateThread Fail");
        assert!(notice.message.contains("capture thread"));
        assert!(err.to_string().contains("no threads"));
    }

    #[test]
    fn test_missing_cpi_notice() {
        let notice = Error::MissingMetadata { field: "cpi" }.notice();
        assert_eq!(notice.title, "No CPI Set");
        assert!(notice.message.contains("CPI"));
    }

    #[test]
    fn test_export_open_notice() {
        let err = Error::ExportOpen {
            path: PathBuf::from("/readonly/out.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/readonly/out.csv"));
        let notice = err.notice();
        assert_eq!(notice.title, "Data Save Failed");
        assert_eq!(notice.message, "Failed to open output file");
    }

    #[test]
    fn test_source_activate_error() {
        let err = Error::source_activate("passive", "no dispatch context");
        let msg = err.to_string();
        assert!(msg.contains("passive"));
        assert!(msg.contains("no dispatch context"));
        assert_eq!(err.notice().title, "Capture Failed");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "batch_size must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("batch_size"));
        assert_eq!(err.notice().title, "Configuration Error");
    }
}
