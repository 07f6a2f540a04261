//! Cooperative stop signal shared between the recording state machine and
//! the poller thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Waker = Box<dyn Fn() + Send + Sync>;

/// A cloneable cancellation token.
///
/// Firing the token sets a flag and invokes the waker a platform wait
/// primitive registered, so a thread parked inside an OS wait observes the
/// flag on its next wake.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fired: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl StopSignal {
    /// Create an unfired token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token.
    pub fn fire(&self) {
        self.inner.fired.store(true, Ordering::SeqCst);
        if let Some(waker) = self.inner.waker.lock().as_ref() {
            waker();
        }
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Install the function invoked on [`fire`](StopSignal::fire).
    ///
    /// Replaces any previous waker. If the token already fired the waker
    /// runs immediately.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        let mut slot = self.inner.waker.lock();
        *slot = Some(Box::new(waker));
        if self.is_set() {
            if let Some(waker) = slot.as_ref() {
                waker();
            }
        }
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("fired", &self.is_set())
            .field("has_waker", &self.inner.waker.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counting_waker(signal: &StopSignal) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        signal.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn test_new_is_unset() {
        assert!(!StopSignal::new().is_set());
    }

    #[test]
    fn test_clones_share_state() {
        let a = StopSignal::new();
        let b = a.clone();
        a.fire();
        assert!(b.is_set());
    }

    #[test]
    fn test_fire_from_other_thread() {
        let signal = StopSignal::new();
        let calls = counting_waker(&signal);
        let remote = signal.clone();
        thread::spawn(move || remote.fire()).join().unwrap();
        assert!(signal.is_set());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waker_invoked_on_fire() {
        let signal = StopSignal::new();
        let calls = counting_waker(&signal);
        signal.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waker_runs_if_already_fired() {
        let signal = StopSignal::new();
        signal.fire();
        let calls = counting_waker(&signal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_waker_replaces_previous() {
        let signal = StopSignal::new();
        let first = counting_waker(&signal);
        let second = counting_waker(&signal);
        signal.fire();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_output() {
        let debug_str = format!("{:?}", StopSignal::new());
        assert!(debug_str.contains("StopSignal"));
        assert!(debug_str.contains("fired"));
    }
}
