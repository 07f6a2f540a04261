//! Active acquisition on a dedicated polling thread.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError};
use tracing::{debug, info, trace, warn};

use super::{AcquisitionSource, ActivationError, InputBackend, RawInputQueue, Reclaimed};
use crate::error::{Error, Result};
use crate::session::{CaptureSession, RecordingState, SourceKind, StateWatch};
use crate::signal::StopSignal;

const THREAD_NAME: &str = "mousetrace-poller";

/// Drains raw input on its own elevated thread.
///
/// The thread owns the session for the lifetime of the capture and hands it
/// back when joined. It exits when the recording stops or when the stop
/// signal is fired externally.
#[derive(Debug)]
pub struct ActivePoller<B> {
    backend: B,
    batch_size: usize,
    elevate: bool,
    stack_size: Option<usize>,
    handle: Option<PollerHandle>,
}

/// Handle to a running poller thread.
#[derive(Debug)]
pub struct PollerHandle {
    thread: JoinHandle<Option<Reclaimed>>,
    stop: StopSignal,
    watch: StateWatch,
}

impl PollerHandle {
    /// Ask the thread to exit after its current batch.
    pub fn stop(&self) {
        self.stop.fire();
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Recording state as last published by the thread.
    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.watch.get()
    }

    /// Wait for the thread to exit and take its session back.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread panicked or never received the session.
    pub fn join(self) -> Result<Reclaimed> {
        match self.thread.join() {
            Ok(Some(reclaimed)) => Ok(reclaimed),
            Ok(None) => Err(Error::internal("poller thread exited without a session")),
            Err(_) => Err(Error::internal("poller thread panicked")),
        }
    }
}

impl<B: InputBackend> ActivePoller<B> {
    /// Create a poller draining at most `batch_size` events per wake.
    #[must_use]
    pub fn new(backend: B, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            elevate: true,
            stack_size: None,
            handle: None,
        }
    }

    /// Whether the thread raises its own priority before polling.
    #[must_use]
    pub fn with_elevation(mut self, elevate: bool) -> Self {
        self.elevate = elevate;
        self
    }

    /// Stack size for the polling thread, or `None` for the platform default.
    #[must_use]
    pub fn with_stack_size(mut self, stack_size: Option<usize>) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// The running thread, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&PollerHandle> {
        self.handle.as_ref()
    }

    /// Wait for the thread to exit on its own and take the session back.
    ///
    /// Blocks until the recording ends. Returns `Ok(None)` if no thread is
    /// running.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was lost.
    pub fn wait(&mut self) -> Result<Option<Reclaimed>> {
        self.handle.take().map(PollerHandle::join).transpose()
    }

    fn spawn(
        &self,
        sessions: Receiver<CaptureSession>,
        stop: StopSignal,
    ) -> std::io::Result<JoinHandle<Option<Reclaimed>>> {
        let backend = self.backend.clone();
        let batch_size = self.batch_size;
        let elevate = self.elevate;

        let mut builder = thread::Builder::new().name(THREAD_NAME.to_string());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || {
            let session = sessions.recv().ok()?;
            Some(run(&backend, session, &stop, batch_size, elevate))
        })
    }
}

impl<B: InputBackend> AcquisitionSource for ActivePoller<B> {
    fn kind(&self) -> SourceKind {
        SourceKind::ActivePoller
    }

    fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(PollerHandle::is_finished)
    }

    fn activate(
        &mut self,
        mut session: CaptureSession,
    ) -> std::result::Result<(), ActivationError> {
        if self.handle.is_some() {
            return Err(ActivationError {
                session,
                error: Error::CaptureInProgress,
            });
        }
        if session.state() != RecordingState::Idle {
            let error = Error::InvalidTransition {
                state: session.state(),
                action: "arm",
            };
            return Err(ActivationError { session, error });
        }

        // The thread is created before the session is armed so a spawn
        // failure leaves it idle and untouched.
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stop = StopSignal::new();
        let thread = match self.spawn(rx, stop.clone()) {
            Ok(thread) => thread,
            Err(source) => {
                warn!(error = %source, "Failed to create poller thread");
                return Err(ActivationError {
                    session,
                    error: Error::ThreadSpawn { source },
                });
            }
        };

        if let Err(error) = session.arm(SourceKind::ActivePoller, Some(stop.clone())) {
            drop(tx);
            let _ = thread.join();
            return Err(ActivationError { session, error });
        }
        let watch = session.watch();

        if let Err(SendError(mut session)) = tx.send(session) {
            let _ = thread.join();
            session.abort();
            return Err(ActivationError {
                session,
                error: Error::internal("poller thread exited before receiving the session"),
            });
        }

        debug!(
            backend = self.backend.name(),
            batch_size = self.batch_size,
            "Poller thread started"
        );
        self.handle = Some(PollerHandle { thread, stop, watch });
        Ok(())
    }

    fn reclaim(&mut self) -> Result<Option<Reclaimed>> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };
        handle.stop();
        handle.join().map(Some)
    }
}

fn run<B: InputBackend>(
    backend: &B,
    mut session: CaptureSession,
    stop: &StopSignal,
    batch_size: usize,
    elevate: bool,
) -> Reclaimed {
    if elevate {
        if let Err(e) = backend.elevate_current_thread() {
            warn!(error = %e, "Failed to raise poller thread priority");
        }
    }

    let error = match backend.open_queue(batch_size) {
        Ok(mut queue) => poll(&mut queue, &mut session, stop, batch_size).err(),
        Err(e) => {
            warn!(error = %e, "Failed to open raw input queue");
            Some(e)
        }
    };

    session.abort();
    Reclaimed { session, error }
}

// One timestamp is taken per wake and shared by every event drained in that
// batch.
fn poll<Q: RawInputQueue>(
    queue: &mut Q,
    session: &mut CaptureSession,
    stop: &StopSignal,
    batch_size: usize,
) -> Result<()> {
    let mut batch = Vec::with_capacity(batch_size);
    let mut batches: u64 = 0;

    loop {
        queue.wait(stop)?;
        if stop.is_set() {
            break;
        }

        let timestamp = queue.now();
        batch.clear();
        if let Err(e) = queue.drain(&mut batch) {
            trace!(error = %e, "Raw input drain failed");
            continue;
        }

        batches += 1;
        for raw in &batch {
            session.handle_event(raw, timestamp);
        }
    }

    info!(batches, samples = session.samples().len(), "Poller thread exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::RawEvent;
    use crate::sample::{ButtonFlags, DeviceHandle, Ticks, TriggerButton};
    use crate::source::{Registration, ScriptedBackend};

    const DEVICE: DeviceHandle = DeviceHandle(3);

    fn idle_session() -> CaptureSession {
        CaptureSession::new(4, TriggerButton::Left)
    }

    #[test]
    fn test_poller_records_until_button_up() {
        let backend = ScriptedBackend::new(1000);
        backend.push_batch(Ticks(0), vec![RawEvent::buttons(DEVICE, ButtonFlags::LEFT_DOWN)]);
        backend.push_batch(
            Ticks(10),
            vec![RawEvent::motion(DEVICE, 1, 1), RawEvent::motion(DEVICE, 2, 2)],
        );
        backend.push_batch(Ticks(20), vec![RawEvent::buttons(DEVICE, ButtonFlags::LEFT_UP)]);

        let mut poller = ActivePoller::new(backend.clone(), 32);
        poller.activate(idle_session()).unwrap();
        let reclaimed = poller.wait().unwrap().unwrap();

        assert!(reclaimed.error.is_none());
        let session = reclaimed.session;
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.start_timestamp(), Some(Ticks(0)));
        assert_eq!(session.end_timestamp(), Some(Ticks(20)));

        let times: Vec<_> = session.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![Ticks(0), Ticks(10), Ticks(10)]);
        assert_eq!(backend.elevations(), 1);
        assert_eq!(
            backend.registrations(),
            vec![Registration::QueueOpened, Registration::QueueClosed]
        );
    }

    #[test]
    fn test_events_after_button_up_in_same_batch_not_recorded() {
        let backend = ScriptedBackend::new(1000);
        backend.push_batch(
            Ticks(5),
            vec![
                RawEvent::buttons(DEVICE, ButtonFlags::LEFT_DOWN),
                RawEvent::motion(DEVICE, 1, 0),
                RawEvent::buttons(DEVICE, ButtonFlags::LEFT_UP),
                RawEvent::motion(DEVICE, 9, 9),
            ],
        );

        let mut poller = ActivePoller::new(backend, 32);
        poller.activate(idle_session()).unwrap();
        let session = poller.wait().unwrap().unwrap().session;
        assert_eq!(session.samples().len(), 2);
    }

    #[test]
    fn test_reclaim_stops_idle_thread() {
        let backend = ScriptedBackend::new(1000);
        let mut poller = ActivePoller::new(backend.clone(), 32);
        poller.activate(idle_session()).unwrap();
        assert!(poller.is_active());

        let reclaimed = poller.reclaim().unwrap().unwrap();
        assert_eq!(reclaimed.session.state(), RecordingState::Idle);
        assert!(reclaimed.session.samples().is_empty());
        assert!(!poller.is_active());
        assert!(poller.reclaim().unwrap().is_none());
    }

    #[test]
    fn test_reclaim_mid_recording_keeps_samples() {
        let backend = ScriptedBackend::new(1000);
        backend.push_batch(
            Ticks(0),
            vec![
                RawEvent::buttons(DEVICE, ButtonFlags::LEFT_DOWN),
                RawEvent::motion(DEVICE, 4, 4),
            ],
        );

        let mut poller = ActivePoller::new(backend.clone(), 32);
        poller.activate(idle_session()).unwrap();
        while backend.pending_batches() > 0 {
            thread::yield_now();
        }
        while poller.handle().is_some_and(|h| h.state() != RecordingState::Recording) {
            thread::yield_now();
        }

        let session = poller.reclaim().unwrap().unwrap().session;
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.samples().len(), 2);
    }

    #[test]
    fn test_second_activation_rejected() {
        let backend = ScriptedBackend::new(1000);
        let mut poller = ActivePoller::new(backend, 32);
        poller.activate(idle_session()).unwrap();

        let err = poller.activate(idle_session()).unwrap_err();
        assert!(err.error.is_capture_in_progress());
        assert_eq!(err.session.state(), RecordingState::Idle);
        poller.reclaim().unwrap();
    }

    #[test]
    fn test_queue_open_failure_returns_session() {
        let backend = ScriptedBackend::new(1000);
        backend.fail_queue_open(true);

        let mut poller = ActivePoller::new(backend, 32);
        poller.activate(idle_session()).unwrap();
        let reclaimed = poller.wait().unwrap().unwrap();
        assert!(matches!(reclaimed.error, Some(Error::Platform(_))));
        assert_eq!(reclaimed.session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_elevation_can_be_disabled() {
        let backend = ScriptedBackend::new(1000);
        let mut poller = ActivePoller::new(backend.clone(), 32).with_elevation(false);
        poller.activate(idle_session()).unwrap();
        poller.reclaim().unwrap();
        assert_eq!(backend.elevations(), 0);
    }

    #[test]
    fn test_batches_split_at_batch_size() {
        let backend = ScriptedBackend::new(1000);
        backend.push_batch(
            Ticks(1),
            vec![
                RawEvent::buttons(DEVICE, ButtonFlags::LEFT_DOWN),
                RawEvent::motion(DEVICE, 1, 0),
                RawEvent::motion(DEVICE, 2, 0),
                RawEvent::buttons(DEVICE, ButtonFlags::LEFT_UP),
            ],
        );

        let mut poller = ActivePoller::new(backend, 2);
        poller.activate(idle_session()).unwrap();
        let session = poller.wait().unwrap().unwrap().session;
        assert_eq!(session.samples().len(), 3);
        assert_eq!(session.end_timestamp(), Some(Ticks(1)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_spawn_failure_leaves_session_idle() {
        let backend = ScriptedBackend::new(1000);
        let mut poller = ActivePoller::new(backend, 32).with_stack_size(Some(1 << 62));

        let mut session = idle_session();
        session.set_trigger(TriggerButton::Right).unwrap();
        let err = poller.activate(session).unwrap_err();

        assert!(matches!(err.error, Error::ThreadSpawn { .. }));
        assert_eq!(err.error.notice().title, "CreateThread Fail");
        assert_eq!(err.session.state(), RecordingState::Idle);
        assert_eq!(err.session.trigger(), TriggerButton::Right);
        assert!(!poller.is_active());
    }
}
