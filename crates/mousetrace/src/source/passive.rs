//! Passive acquisition through the message-dispatch path.

use tracing::{debug, warn};

use super::{AcquisitionSource, ActivationError, ContextId, InputBackend, Reclaimed};
use crate::error::{Error, Result};
use crate::normalize::RawEvent;
use crate::sample::Ticks;
use crate::session::{CaptureSession, Dispatch, RecordingState, SourceKind};

/// Receives raw input delivered to an existing dispatch context.
///
/// No thread is created. Events are routed in by whoever owns the dispatch
/// loop, so normalization and state changes run on that thread without
/// further synchronization.
#[derive(Debug)]
pub struct PassiveSource<B> {
    backend: B,
    context: Option<ContextId>,
    session: Option<CaptureSession>,
    registered: bool,
}

impl<B: InputBackend> PassiveSource<B> {
    /// Create a source with no dispatch context yet.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            context: None,
            session: None,
            registered: false,
        }
    }

    /// Set the context events are registered for.
    pub fn set_context(&mut self, context: ContextId) {
        self.context = Some(context);
    }

    /// Whether the context is currently registered for raw input.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Route one event delivered to the context.
    ///
    /// Returns `None` if the source holds no session. The registration is
    /// dropped as soon as the event ends the recording.
    pub fn dispatch(&mut self, raw: &RawEvent, timestamp: Ticks) -> Option<Dispatch> {
        let dispatch = self.session.as_mut()?.handle_event(raw, timestamp);
        if dispatch.stopped {
            self.release();
        }
        Some(dispatch)
    }

    fn release(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Some(context) = self.context {
            match self.backend.unregister(context) {
                Ok(()) => debug!(backend = self.backend.name(), "Passive registration removed"),
                Err(e) => warn!(error = %e, "Failed to remove passive registration"),
            }
        }
    }
}

impl<B: InputBackend> AcquisitionSource for PassiveSource<B> {
    fn kind(&self) -> SourceKind {
        SourceKind::Passive
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn is_finished(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.state() == RecordingState::Idle)
    }

    fn activate(
        &mut self,
        mut session: CaptureSession,
    ) -> std::result::Result<(), ActivationError> {
        if self.session.is_some() {
            return Err(ActivationError {
                session,
                error: Error::CaptureInProgress,
            });
        }
        let Some(context) = self.context else {
            return Err(ActivationError {
                session,
                error: Error::source_activate("passive", "no dispatch context"),
            });
        };

        if let Err(error) = self.backend.register_passive(context) {
            return Err(ActivationError { session, error });
        }
        self.registered = true;

        if let Err(error) = session.arm(SourceKind::Passive, None) {
            self.release();
            return Err(ActivationError { session, error });
        }

        debug!(backend = self.backend.name(), ?context, "Passive source active");
        self.session = Some(session);
        Ok(())
    }

    fn reclaim(&mut self) -> Result<Option<Reclaimed>> {
        self.release();
        Ok(self.session.take().map(|mut session| {
            session.abort();
            Reclaimed {
                session,
                error: None,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ButtonFlags, DeviceHandle, TriggerButton};
    use crate::source::{Registration, ScriptedBackend};

    const CONTEXT: ContextId = ContextId(77);

    fn source() -> (ScriptedBackend, PassiveSource<ScriptedBackend>) {
        let backend = ScriptedBackend::new(1000);
        let mut source = PassiveSource::new(backend.clone());
        source.set_context(CONTEXT);
        (backend, source)
    }

    fn idle_session() -> CaptureSession {
        CaptureSession::new(8, TriggerButton::Left)
    }

    #[test]
    fn test_activate_registers_and_arms() {
        let (backend, mut source) = source();
        source.activate(idle_session()).unwrap();
        assert!(source.is_active());
        assert!(source.is_registered());
        assert!(!source.is_finished());
        assert_eq!(backend.registrations(), vec![Registration::Passive(CONTEXT)]);
    }

    #[test]
    fn test_activate_without_context_fails() {
        let mut source = PassiveSource::new(ScriptedBackend::new(1000));
        let err = source.activate(idle_session()).unwrap_err();
        assert!(matches!(err.error, Error::SourceActivate { .. }));
        assert_eq!(err.session.state(), RecordingState::Idle);
        assert!(!source.is_active());
    }

    #[test]
    fn test_activate_twice_rejected() {
        let (_backend, mut source) = source();
        source.activate(idle_session()).unwrap();
        let err = source.activate(idle_session()).unwrap_err();
        assert!(err.error.is_capture_in_progress());
    }

    #[test]
    fn test_button_up_unregisters() {
        let (backend, mut source) = source();
        source.activate(idle_session()).unwrap();
        let device = DeviceHandle(1);

        source.dispatch(&RawEvent::buttons(device, ButtonFlags::LEFT_DOWN), Ticks(0));
        source.dispatch(&RawEvent::motion(device, 2, 3), Ticks(1));
        let dispatch = source
            .dispatch(&RawEvent::buttons(device, ButtonFlags::LEFT_UP), Ticks(2))
            .unwrap();

        assert!(dispatch.stopped);
        assert!(!source.is_registered());
        assert!(source.is_finished());
        assert_eq!(
            backend.registrations(),
            vec![
                Registration::Passive(CONTEXT),
                Registration::Unregister(CONTEXT)
            ]
        );

        let reclaimed = source.reclaim().unwrap().unwrap();
        assert!(reclaimed.error.is_none());
        assert_eq!(reclaimed.session.samples().len(), 2);
        assert_eq!(backend.registrations().len(), 2);
    }

    #[test]
    fn test_dispatch_without_session() {
        let (_backend, mut source) = source();
        assert!(source
            .dispatch(&RawEvent::motion(DeviceHandle(1), 1, 1), Ticks(0))
            .is_none());
    }

    #[test]
    fn test_reclaim_mid_recording_aborts() {
        let (backend, mut source) = source();
        source.activate(idle_session()).unwrap();
        source.dispatch(
            &RawEvent::buttons(DeviceHandle(1), ButtonFlags::LEFT_DOWN),
            Ticks(0),
        );
        let reclaimed = source.reclaim().unwrap().unwrap();
        assert_eq!(reclaimed.session.state(), RecordingState::Idle);
        assert_eq!(reclaimed.session.samples().len(), 1);
        assert!(backend
            .registrations()
            .contains(&Registration::Unregister(CONTEXT)));
        assert!(source.reclaim().unwrap().is_none());
    }
}
