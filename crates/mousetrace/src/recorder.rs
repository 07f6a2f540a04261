//! The capture controller.
//!
//! [`Recorder`] owns the one capture session of the process and moves it
//! between the idle slot and whichever acquisition source is live. Reading
//! the buffer (for export) is only possible from the idle slot, so it never
//! overlaps with a poller thread that could be growing it.

use tracing::{info, warn};

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::export::{ExportMetadata, ExportSink, SessionRecord};
use crate::normalize::RawEvent;
use crate::sample::{Ticks, TriggerButton};
use crate::session::{CaptureSession, Dispatch, RecordingState, SourceKind, StateWatch};
use crate::source::{
    AcquisitionSource, ActivePoller, ContextId, InputBackend, PassiveSource, Reclaimed,
};

/// Drives capture sessions over an [`InputBackend`].
#[derive(Debug)]
pub struct Recorder<B: InputBackend> {
    backend: B,
    passive: PassiveSource<B>,
    poller: ActivePoller<B>,
    idle: Option<CaptureSession>,
    live: Option<SourceKind>,
    watch: StateWatch,
    capacity: usize,
    trigger: TriggerButton,
}

impl<B: InputBackend> Recorder<B> {
    /// Create a recorder configured by `config`.
    #[must_use]
    pub fn new(backend: B, config: &CaptureConfig) -> Self {
        let session = CaptureSession::new(config.initial_capacity, config.trigger_button);
        let poller = ActivePoller::new(backend.clone(), config.batch_size)
            .with_elevation(config.elevate_priority)
            .with_stack_size(config.poller_stack_size);

        Self {
            passive: PassiveSource::new(backend.clone()),
            poller,
            backend,
            watch: session.watch(),
            idle: Some(session),
            live: None,
            capacity: config.initial_capacity,
            trigger: config.trigger_button,
        }
    }

    /// Set the dispatch context used for passive captures.
    #[must_use]
    pub fn with_passive_context(mut self, context: ContextId) -> Self {
        self.passive.set_context(context);
        self
    }

    /// The input backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current recording state, readable while a poller owns the session.
    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.watch.get()
    }

    /// The source holding the session, if any.
    #[must_use]
    pub fn active_source(&self) -> Option<SourceKind> {
        self.live
    }

    /// Whether a source is live and its recording has not ended yet.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.live.is_some_and(|kind| !self.source(kind).is_finished())
    }

    /// The session, when no source holds it.
    #[must_use]
    pub fn session(&self) -> Option<&CaptureSession> {
        self.idle.as_ref()
    }

    /// Change the trigger button for the next capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureInProgress`] while a source is live.
    pub fn set_trigger(&mut self, trigger: TriggerButton) -> Result<()> {
        self.settle()?;
        let session = self.idle.as_mut().ok_or(Error::CaptureInProgress)?;
        session.set_trigger(trigger)?;
        self.trigger = trigger;
        Ok(())
    }

    /// Arm a new capture fed by `mode`.
    ///
    /// A source whose recording has already ended is reclaimed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureInProgress`] while another capture is still
    /// running, or the activation error of the source. A failed activation
    /// leaves the previous samples in place.
    pub fn start_capture(&mut self, mode: SourceKind) -> Result<()> {
        self.settle()?;
        if self.live.is_some() {
            return Err(Error::CaptureInProgress);
        }
        let session = self
            .idle
            .take()
            .ok_or_else(|| Error::internal("capture session missing"))?;

        match self.source_mut(mode).activate(session) {
            Ok(()) => {
                self.live = Some(mode);
                info!(source = %mode, backend = self.backend.name(), "Capture started");
                Ok(())
            }
            Err(rejected) => {
                let (session, error) = rejected.into_parts();
                self.idle = Some(session);
                warn!(source = %mode, error = %error, "Capture could not start");
                Err(error)
            }
        }
    }

    /// Route an event delivered on the dispatch thread, stamped now.
    pub fn dispatch_passive(&mut self, raw: &RawEvent) -> Option<Dispatch> {
        let timestamp = self.backend.now();
        self.dispatch_passive_at(raw, timestamp)
    }

    /// Route an event delivered on the dispatch thread.
    ///
    /// Returns `None` unless a passive capture is live.
    pub fn dispatch_passive_at(&mut self, raw: &RawEvent, timestamp: Ticks) -> Option<Dispatch> {
        if self.live != Some(SourceKind::Passive) {
            return None;
        }
        self.passive.dispatch(raw, timestamp)
    }

    /// Block until a poller capture ends on its own and take the session back.
    ///
    /// A finished passive capture is reclaimed. Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the poller, if any, and
    /// [`Error::CaptureInProgress`] for a passive capture that has not ended,
    /// since its events arrive on the calling thread.
    pub fn wait_for_completion(&mut self) -> Result<()> {
        match self.live {
            Some(SourceKind::ActivePoller) => {
                self.live = None;
                let waited = self.poller.wait();
                self.restore(waited)
            }
            Some(SourceKind::Passive) => {
                self.settle()?;
                if self.live.is_some() {
                    Err(Error::CaptureInProgress)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Stop the live source and end its recording, keeping the samples.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the source, if any.
    pub fn cancel(&mut self) -> Result<()> {
        match self.live {
            Some(kind) => {
                info!(source = %kind, "Capture cancelled");
                self.reclaim(kind)
            }
            None => Ok(()),
        }
    }

    /// A record of the last capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureInProgress`] while a source is live.
    pub fn record<'a>(&'a mut self, metadata: &'a ExportMetadata) -> Result<SessionRecord<'a>> {
        self.settle()?;
        let ticks_per_second = self.backend.ticks_per_second();
        let session = self.idle.as_ref().ok_or(Error::CaptureInProgress)?;
        Ok(SessionRecord::new(metadata, session, ticks_per_second))
    }

    /// Serialize the last capture into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureInProgress`] while a source is live, or the
    /// sink's error. The buffer is never modified.
    pub fn export(&mut self, metadata: &ExportMetadata, sink: &mut dyn ExportSink) -> Result<()> {
        let record = self.record(metadata)?;
        sink.write_record(&record)
    }

    fn source(&self, kind: SourceKind) -> &dyn AcquisitionSource {
        match kind {
            SourceKind::Passive => &self.passive,
            SourceKind::ActivePoller => &self.poller,
        }
    }

    fn source_mut(&mut self, kind: SourceKind) -> &mut dyn AcquisitionSource {
        match kind {
            SourceKind::Passive => &mut self.passive,
            SourceKind::ActivePoller => &mut self.poller,
        }
    }

    // Take the session back from a source whose recording already ended.
    fn settle(&mut self) -> Result<()> {
        match self.live {
            Some(kind) if self.source(kind).is_finished() => self.reclaim(kind),
            _ => Ok(()),
        }
    }

    fn reclaim(&mut self, kind: SourceKind) -> Result<()> {
        self.live = None;
        let reclaimed = self.source_mut(kind).reclaim();
        self.restore(reclaimed)
    }

    fn restore(&mut self, reclaimed: Result<Option<Reclaimed>>) -> Result<()> {
        match reclaimed {
            Ok(Some(Reclaimed { session, error })) => {
                self.idle = Some(session);
                error.map_or(Ok(()), Err)
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Capture session lost, starting a fresh one");
                let session = CaptureSession::new(self.capacity, self.trigger);
                self.watch = session.watch();
                self.idle = Some(session);
                Err(e)
            }
        }
    }
}

impl<B: InputBackend> Drop for Recorder<B> {
    fn drop(&mut self) {
        if let Err(e) = self.cancel() {
            warn!(error = %e, "Capture ended with an error during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CsvSink;
    use crate::sample::{ButtonFlags, DeviceHandle};
    use crate::source::{Registration, ScriptedBackend};

    const DEVICE: DeviceHandle = DeviceHandle(9);
    const CONTEXT: ContextId = ContextId(1);

    fn config() -> CaptureConfig {
        CaptureConfig {
            initial_capacity: 4,
            ..CaptureConfig::default()
        }
    }

    fn recorder() -> (ScriptedBackend, Recorder<ScriptedBackend>) {
        let backend = ScriptedBackend::new(1000);
        let recorder = Recorder::new(backend.clone(), &config()).with_passive_context(CONTEXT);
        (backend, recorder)
    }

    fn down() -> RawEvent {
        RawEvent::buttons(DEVICE, ButtonFlags::LEFT_DOWN)
    }

    fn up() -> RawEvent {
        RawEvent::buttons(DEVICE, ButtonFlags::LEFT_UP)
    }

    #[test]
    fn test_passive_capture_and_export() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        assert_eq!(recorder.state(), RecordingState::Armed);
        assert!(recorder.is_capturing());

        recorder.dispatch_passive_at(&down(), Ticks(0));
        recorder.dispatch_passive_at(&RawEvent::motion(DEVICE, 1, 1), Ticks(10));
        let dispatch = recorder.dispatch_passive_at(&up(), Ticks(20)).unwrap();
        assert!(dispatch.stopped);
        assert!(!recorder.is_capturing());

        let metadata = ExportMetadata::new("Run", "800").unwrap();
        let mut sink = CsvSink::new(Vec::new());
        recorder.export(&metadata, &mut sink).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.ends_with("0,0,0.000,1\n1,-1,10.000,0\n"));
        assert_eq!(recorder.active_source(), None);
        assert_eq!(recorder.session().unwrap().samples().len(), 2);
    }

    #[test]
    fn test_start_while_live_refused() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        let err = recorder.start_capture(SourceKind::ActivePoller).unwrap_err();
        assert!(err.is_capture_in_progress());
        assert_eq!(recorder.active_source(), Some(SourceKind::Passive));
    }

    #[test]
    fn test_export_while_live_refused() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        recorder.dispatch_passive_at(&down(), Ticks(0));

        let metadata = ExportMetadata::new("Run", "800").unwrap();
        let mut sink = CsvSink::new(Vec::new());
        let err = recorder.export(&metadata, &mut sink).unwrap_err();
        assert!(err.is_capture_in_progress());
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn test_restart_after_finished_capture() {
        let (backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        recorder.dispatch_passive_at(&down(), Ticks(0));
        recorder.dispatch_passive_at(&up(), Ticks(5));

        recorder.start_capture(SourceKind::Passive).unwrap();
        assert_eq!(recorder.state(), RecordingState::Armed);
        assert_eq!(
            backend.registrations(),
            vec![
                Registration::Passive(CONTEXT),
                Registration::Unregister(CONTEXT),
                Registration::Passive(CONTEXT),
            ]
        );
    }

    #[test]
    fn test_dispatch_ignored_when_not_passive() {
        let (_backend, mut recorder) = recorder();
        assert!(recorder.dispatch_passive(&down()).is_none());
    }

    #[test]
    fn test_cancel_passive_keeps_samples() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        recorder.dispatch_passive_at(&down(), Ticks(0));
        recorder.dispatch_passive_at(&RawEvent::motion(DEVICE, 3, 3), Ticks(1));
        recorder.cancel().unwrap();

        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(recorder.active_source(), None);
        assert_eq!(recorder.session().unwrap().samples().len(), 2);
    }

    #[test]
    fn test_wait_for_unfinished_passive() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::Passive).unwrap();
        assert!(recorder.wait_for_completion().unwrap_err().is_capture_in_progress());
        recorder.dispatch_passive_at(&down(), Ticks(0));
        recorder.dispatch_passive_at(&up(), Ticks(1));
        recorder.wait_for_completion().unwrap();
        assert!(recorder.session().is_some());
    }

    #[test]
    fn test_poller_capture() {
        let (backend, mut recorder) = recorder();
        backend.push_batch(Ticks(0), vec![down()]);
        backend.push_batch(Ticks(10), vec![RawEvent::motion(DEVICE, 5, -5)]);
        backend.push_batch(Ticks(20), vec![up()]);

        recorder.start_capture(SourceKind::ActivePoller).unwrap();
        recorder.wait_for_completion().unwrap();

        assert_eq!(recorder.state(), RecordingState::Idle);
        let session = recorder.session().unwrap();
        assert_eq!(session.samples().len(), 2);
        assert_eq!(session.end_timestamp(), Some(Ticks(20)));
    }

    #[test]
    fn test_poller_cancel() {
        let (_backend, mut recorder) = recorder();
        recorder.start_capture(SourceKind::ActivePoller).unwrap();
        assert!(recorder.session().is_none());
        recorder.cancel().unwrap();
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(recorder.session().is_some());
    }

    #[test]
    fn test_poller_queue_failure_surfaces() {
        let (backend, mut recorder) = recorder();
        backend.fail_queue_open(true);
        recorder.start_capture(SourceKind::ActivePoller).unwrap();
        let err = recorder.wait_for_completion().unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
        assert!(recorder.session().is_some());

        backend.fail_queue_open(false);
        recorder.start_capture(SourceKind::ActivePoller).unwrap();
        recorder.cancel().unwrap();
    }

    #[test]
    fn test_passive_without_context_fails() {
        let backend = ScriptedBackend::new(1000);
        let mut recorder = Recorder::new(backend, &config());
        let err = recorder.start_capture(SourceKind::Passive).unwrap_err();
        assert!(matches!(err, Error::SourceActivate { .. }));
        assert!(recorder.session().is_some());
        assert!(recorder.active_source().is_none());
    }

    #[test]
    fn test_set_trigger() {
        let (_backend, mut recorder) = recorder();
        recorder.set_trigger(TriggerButton::Right).unwrap();
        recorder.start_capture(SourceKind::Passive).unwrap();

        recorder.dispatch_passive_at(&down(), Ticks(0));
        assert_eq!(recorder.state(), RecordingState::Armed);
        recorder.dispatch_passive_at(&RawEvent::buttons(DEVICE, ButtonFlags::RIGHT_DOWN), Ticks(1));
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert!(recorder.set_trigger(TriggerButton::Left).is_err());
    }
}
