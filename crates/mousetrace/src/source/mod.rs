//! Acquisition sources.
//!
//! The platform layer exposes its raw input facilities through
//! [`InputBackend`]. Two [`AcquisitionSource`]s are built on top of it:
//!
//! - [`PassiveSource`]: events arrive on the caller's message-dispatch
//!   thread and are routed in with [`PassiveSource::dispatch`].
//! - [`ActivePoller`]: a dedicated, elevated thread waits on a
//!   [`RawInputQueue`] and drains it in bounded batches.
//!
//! Both take ownership of an idle [`CaptureSession`] on activation and give
//! it back on reclaim, so exactly one party writes to the buffer at a time.

mod passive;
mod poller;
pub mod scripted;

use std::fmt;

pub use passive::PassiveSource;
pub use poller::{ActivePoller, PollerHandle};
pub use scripted::{Registration, ScriptedBackend, ScriptedQueue};

use crate::error::{Error, Result};
use crate::normalize::RawEvent;
use crate::sample::Ticks;
use crate::session::{CaptureSession, SourceKind};
use crate::signal::StopSignal;

/// Opaque identifier of a message-dispatch context (a window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub isize);

/// Raw input capabilities of a platform.
pub trait InputBackend: fmt::Debug + Clone + Send + 'static {
    /// The queue type opened by [`open_queue`](InputBackend::open_queue).
    type Queue: RawInputQueue;

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Route raw pointer input to `context`'s dispatch path.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the registration.
    fn register_passive(&self, context: ContextId) -> Result<()>;

    /// Stop routing raw pointer input to `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the removal.
    fn unregister(&self, context: ContextId) -> Result<()>;

    /// Open a raw input queue bound to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be created or registered.
    fn open_queue(&self, batch_size: usize) -> Result<Self::Queue>;

    /// Raise the calling thread to the highest scheduling priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the change.
    fn elevate_current_thread(&self) -> Result<()> {
        Ok(())
    }

    /// Current reading of the monotonic tick counter.
    fn now(&self) -> Ticks;

    /// Tick counter frequency.
    fn ticks_per_second(&self) -> i64;
}

/// A thread-bound queue of raw input events.
pub trait RawInputQueue {
    /// Block until input is pending or `stop` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying wait fails.
    fn wait(&mut self, stop: &StopSignal) -> Result<()>;

    /// Move at most one batch of pending events into `out`, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform read fails; the poller skips the
    /// batch and keeps going.
    fn drain(&mut self, out: &mut Vec<RawEvent>) -> Result<()>;

    /// Acquisition timestamp for the next drained batch.
    fn now(&self) -> Ticks;
}

/// A session returned by a source, with the error that ended it, if any.
#[derive(Debug)]
pub struct Reclaimed {
    /// The session, always idle.
    pub session: CaptureSession,
    /// Failure observed while the source ran.
    pub error: Option<Error>,
}

/// An activation that failed, handing the untouched session back.
#[derive(Debug)]
pub struct ActivationError {
    /// The session passed to `activate`, still idle.
    pub session: CaptureSession,
    /// Why activation failed.
    pub error: Error,
}

impl ActivationError {
    /// Split into the session and the error.
    #[must_use]
    pub fn into_parts(self) -> (CaptureSession, Error) {
        (self.session, self.error)
    }
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ActivationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A mechanism that feeds raw events into a capture session.
pub trait AcquisitionSource {
    /// Which mechanism this is.
    fn kind(&self) -> SourceKind;

    /// Whether the source currently holds a session.
    fn is_active(&self) -> bool;

    /// Whether the held session has ended and can be reclaimed without
    /// blocking.
    fn is_finished(&self) -> bool;

    /// Arm `session` and start delivering events into it.
    ///
    /// # Errors
    ///
    /// On failure the session is handed back unarmed.
    fn activate(&mut self, session: CaptureSession) -> std::result::Result<(), ActivationError>;

    /// Stop delivering events and return the session.
    ///
    /// A recording still in progress is aborted. Returns `Ok(None)` if the
    /// source held no session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was lost (the poller thread panicked).
    fn reclaim(&mut self) -> Result<Option<Reclaimed>>;
}
