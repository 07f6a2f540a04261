//! The recording state machine.
//!
//! A [`CaptureSession`] owns the sample buffer together with the state that
//! decides whether incoming events are kept. Button edges of the trigger
//! button drive it through `Idle -> Armed -> Recording -> Idle`; only an
//! explicit [`arm`](CaptureSession::arm) leaves `Idle`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buffer::{SampleBuffer, DEFAULT_CAPACITY};
use crate::error::{Error, Result};
use crate::normalize::{normalize, RawEvent};
use crate::sample::{MotionSample, Ticks, TriggerButton};
use crate::signal::StopSignal;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// Not capturing; a capture request is required.
    #[default]
    Idle,
    /// Waiting for the trigger button to go down.
    Armed,
    /// Appending every mouse event until the trigger button goes up.
    Recording,
}

impl RecordingState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Armed => 1,
            Self::Recording => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Armed,
            2 => Self::Recording,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Recording => write!(f, "recording"),
        }
    }
}

/// The acquisition mechanism feeding a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Events arrive through the existing message-dispatch path.
    #[default]
    Passive,
    /// A dedicated high-priority thread drains the raw input queue.
    ActivePoller,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passive => write!(f, "passive"),
            Self::ActivePoller => write!(f, "active_poller"),
        }
    }
}

/// A read-only view of a session's state that can cross threads.
#[derive(Debug, Clone, Default)]
pub struct StateWatch {
    state: Arc<AtomicU8>,
}

impl StateWatch {
    /// The most recently published state.
    #[must_use]
    pub fn get(&self) -> RecordingState {
        RecordingState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn publish(&self, state: RecordingState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}

/// What a single call to [`CaptureSession::handle_event`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// The event was not a mouse event.
    pub ignored: bool,
    /// The event moved the session from `Armed` to `Recording`.
    pub started: bool,
    /// The event moved the session from `Recording` to `Idle`.
    pub stopped: bool,
    /// The event was stored in the buffer.
    pub appended: bool,
}

/// The single owned capture-session object.
#[derive(Debug)]
pub struct CaptureSession {
    buffer: SampleBuffer,
    state: RecordingState,
    watch: StateWatch,
    start: Option<Ticks>,
    end: Option<Ticks>,
    source: Option<SourceKind>,
    trigger: TriggerButton,
    stop: Option<StopSignal>,
}

impl CaptureSession {
    /// Create an idle session with room for `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize, trigger: TriggerButton) -> Self {
        Self::with_buffer(SampleBuffer::with_capacity(capacity), trigger)
    }

    /// Create an idle session recording into `buffer`.
    #[must_use]
    pub fn with_buffer(buffer: SampleBuffer, trigger: TriggerButton) -> Self {
        Self {
            buffer,
            state: RecordingState::Idle,
            watch: StateWatch::default(),
            start: None,
            end: None,
            source: None,
            trigger,
            stop: None,
        }
    }

    /// Prepare a new recording fed by `source`.
    ///
    /// Discards the previous samples (capacity is kept). `stop` is fired when
    /// the recording ends so a polling thread can exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is idle.
    pub fn arm(&mut self, source: SourceKind, stop: Option<StopSignal>) -> Result<()> {
        if self.state != RecordingState::Idle {
            return Err(Error::InvalidTransition {
                state: self.state,
                action: "arm",
            });
        }

        self.buffer.reset();
        self.start = None;
        self.end = None;
        self.source = Some(source);
        self.stop = stop;
        self.set_state(RecordingState::Armed);
        info!(source = %source, trigger = %self.trigger, "Capture armed");
        Ok(())
    }

    /// Route one raw event through normalization and the edge detector.
    ///
    /// Edges are evaluated even before recording starts; the event is
    /// appended if the session is recording once its edges are applied, so
    /// the event that starts a recording is its first sample.
    pub fn handle_event(&mut self, raw: &RawEvent, timestamp: Ticks) -> Dispatch {
        let Some(sample) = normalize(raw, timestamp) else {
            return Dispatch {
                ignored: true,
                ..Dispatch::default()
            };
        };

        let mut dispatch = Dispatch::default();
        if !sample.buttons.is_empty() {
            self.apply_edges(&sample, &mut dispatch);
        }

        if self.state == RecordingState::Recording {
            dispatch.appended = self.buffer.append(sample);
        }
        dispatch
    }

    // Down is evaluated before up, so an event carrying both edges while
    // armed passes through Recording back to Idle within one call.
    fn apply_edges(&mut self, sample: &MotionSample, dispatch: &mut Dispatch) {
        if sample.buttons.contains(self.trigger.down()) && self.state == RecordingState::Armed {
            self.start = Some(sample.timestamp);
            self.set_state(RecordingState::Recording);
            dispatch.started = true;
            info!(start = %sample.timestamp, "Recording started");
        }

        if sample.buttons.contains(self.trigger.up()) && self.state == RecordingState::Recording {
            self.end = Some(sample.timestamp);
            self.set_state(RecordingState::Idle);
            dispatch.stopped = true;
            if let Some(stop) = &self.stop {
                stop.fire();
            }
            info!(
                end = %sample.timestamp,
                samples = self.buffer.len(),
                dropped = self.buffer.dropped(),
                "Recording stopped"
            );
        }
    }

    /// Force the session back to `Idle`, keeping whatever was recorded.
    pub fn abort(&mut self) {
        if self.state != RecordingState::Idle {
            debug!(state = %self.state, "Capture aborted");
            self.set_state(RecordingState::Idle);
        }
    }

    fn set_state(&mut self, state: RecordingState) {
        self.state = state;
        self.watch.publish(state);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// A cross-thread view of the state.
    #[must_use]
    pub fn watch(&self) -> StateWatch {
        self.watch.clone()
    }

    /// Timestamp of the edge that started the current or last recording.
    #[must_use]
    pub fn start_timestamp(&self) -> Option<Ticks> {
        self.start
    }

    /// Timestamp of the edge that ended the last recording.
    #[must_use]
    pub fn end_timestamp(&self) -> Option<Ticks> {
        self.end
    }

    /// The source selected by the last [`arm`](CaptureSession::arm).
    #[must_use]
    pub fn active_source(&self) -> Option<SourceKind> {
        self.source
    }

    /// The button whose edges drive this session.
    #[must_use]
    pub fn trigger(&self) -> TriggerButton {
        self.trigger
    }

    /// Change the trigger button.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the session is idle.
    pub fn set_trigger(&mut self, trigger: TriggerButton) -> Result<()> {
        if self.state != RecordingState::Idle {
            return Err(Error::InvalidTransition {
                state: self.state,
                action: "change the trigger button",
            });
        }
        self.trigger = trigger;
        Ok(())
    }

    /// The underlying buffer.
    #[must_use]
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// The recorded samples in acquisition order.
    #[must_use]
    pub fn samples(&self) -> &[MotionSample] {
        self.buffer.snapshot()
    }

    /// Ticks elapsed between the recording start and `sample`.
    #[must_use]
    pub fn relative_ticks(&self, sample: &MotionSample) -> i64 {
        sample.timestamp - self.start.unwrap_or_default()
    }

    /// Milliseconds elapsed between the recording start and `sample`.
    #[must_use]
    pub fn relative_ms(&self, sample: &MotionSample, ticks_per_second: i64) -> f64 {
        crate::export::relative_ms(sample.timestamp, self.start.unwrap_or_default(), ticks_per_second)
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, TriggerButton::default())
    }
}
