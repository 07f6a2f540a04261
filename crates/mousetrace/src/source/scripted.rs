//! An in-memory input backend that replays scripted event batches.
//!
//! Used by the `simulate` command and by tests to drive the real poller and
//! passive paths without a platform input stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::{ContextId, InputBackend, RawInputQueue};
use crate::error::{Error, Result};
use crate::normalize::RawEvent;
use crate::sample::{DeviceHandle, Ticks, TriggerButton};
use crate::signal::StopSignal;

/// A registration change observed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A dispatch context was registered for passive delivery.
    Passive(ContextId),
    /// A dispatch context was unregistered.
    Unregister(ContextId),
    /// A polling queue was opened.
    QueueOpened,
    /// A polling queue was closed.
    QueueClosed,
}

#[derive(Debug)]
struct Batch {
    at: Ticks,
    events: Vec<RawEvent>,
}

#[derive(Debug)]
struct Script {
    batches: Mutex<VecDeque<Batch>>,
    ready: Condvar,
    registrations: Mutex<Vec<Registration>>,
    clock: AtomicI64,
    ticks_per_second: i64,
    fail_open: AtomicBool,
    elevations: AtomicUsize,
}

/// Backend whose input is pushed by the caller.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    /// Create a backend with an idle clock at tick zero.
    #[must_use]
    pub fn new(ticks_per_second: i64) -> Self {
        Self {
            script: Arc::new(Script {
                batches: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                registrations: Mutex::new(Vec::new()),
                clock: AtomicI64::new(0),
                ticks_per_second: ticks_per_second.max(1),
                fail_open: AtomicBool::new(false),
                elevations: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a batch of events that a poller will see at tick `at`.
    pub fn push_batch(&self, at: Ticks, events: Vec<RawEvent>) {
        self.script.batches.lock().push_back(Batch { at, events });
        self.script.ready.notify_all();
    }

    /// Batches not yet drained.
    #[must_use]
    pub fn pending_batches(&self) -> usize {
        self.script.batches.lock().len()
    }

    /// Make subsequent queue opens fail.
    pub fn fail_queue_open(&self, fail: bool) {
        self.script.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Registration changes so far, oldest first.
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.script.registrations.lock().clone()
    }

    /// How many threads asked for elevated priority.
    #[must_use]
    pub fn elevations(&self) -> usize {
        self.script.elevations.load(Ordering::SeqCst)
    }

    fn record(&self, registration: Registration) {
        self.script.registrations.lock().push(registration);
    }
}

impl InputBackend for ScriptedBackend {
    type Queue = ScriptedQueue;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn register_passive(&self, context: ContextId) -> Result<()> {
        self.record(Registration::Passive(context));
        Ok(())
    }

    fn unregister(&self, context: ContextId) -> Result<()> {
        self.record(Registration::Unregister(context));
        Ok(())
    }

    fn open_queue(&self, batch_size: usize) -> Result<ScriptedQueue> {
        if self.script.fail_open.load(Ordering::SeqCst) {
            return Err(Error::platform("scripted queue unavailable"));
        }
        self.record(Registration::QueueOpened);
        Ok(ScriptedQueue {
            backend: self.clone(),
            batch_size: batch_size.max(1),
            waker_installed: false,
        })
    }

    fn elevate_current_thread(&self) -> Result<()> {
        self.script.elevations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn now(&self) -> Ticks {
        Ticks(self.script.clock.load(Ordering::SeqCst))
    }

    fn ticks_per_second(&self) -> i64 {
        self.script.ticks_per_second
    }
}

/// Polling queue over a [`ScriptedBackend`].
///
/// Batches larger than the queue's batch size are split; the remainder
/// keeps its timestamp and is delivered on the next drain.
#[derive(Debug)]
pub struct ScriptedQueue {
    backend: ScriptedBackend,
    batch_size: usize,
    waker_installed: bool,
}

impl RawInputQueue for ScriptedQueue {
    fn wait(&mut self, stop: &StopSignal) -> Result<()> {
        let script = &self.backend.script;
        if !self.waker_installed {
            let wake = Arc::clone(script);
            stop.set_waker(move || {
                let _guard = wake.batches.lock();
                wake.ready.notify_all();
            });
            self.waker_installed = true;
        }

        let mut batches = script.batches.lock();
        while batches.is_empty() && !stop.is_set() {
            script.ready.wait(&mut batches);
        }
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<RawEvent>) -> Result<()> {
        let script = &self.backend.script;
        let mut batches = script.batches.lock();
        let Some(mut batch) = batches.pop_front() else {
            return Ok(());
        };
        script.clock.store(batch.at.0, Ordering::SeqCst);

        if batch.events.len() > self.batch_size {
            let rest = batch.events.split_off(self.batch_size);
            batches.push_front(Batch {
                at: batch.at,
                events: rest,
            });
        }
        out.extend(batch.events);
        Ok(())
    }

    fn now(&self) -> Ticks {
        let script = &self.backend.script;
        script
            .batches
            .lock()
            .front()
            .map_or_else(|| self.backend.now(), |batch| batch.at)
    }
}

impl Drop for ScriptedQueue {
    fn drop(&mut self) {
        self.backend.record(Registration::QueueClosed);
    }
}

/// A scripted press, drag and release of `trigger`.
///
/// The press lands at tick zero and each of the `moves` motion events
/// follows `interval` ticks after the previous event, with the release one
/// interval after the last move. Timestamps saturate at `i64::MAX` and a
/// negative interval is treated as zero, so they never decrease.
#[must_use]
pub fn sweep(moves: usize, interval: i64, trigger: TriggerButton) -> Vec<(Ticks, RawEvent)> {
    let device = DeviceHandle(1);
    let mut events = Vec::with_capacity(moves + 2);
    events.push((Ticks(0), RawEvent::buttons(device, trigger.down())));

    let interval = interval.max(0);
    let mut at: i64 = 0;
    for step in 0..moves {
        at = at.saturating_add(interval);
        let step = i32::try_from(step % 8).unwrap_or(0);
        events.push((Ticks(at), RawEvent::motion(device, 1 + step % 3, step - 4)));
    }

    at = at.saturating_add(interval);
    events.push((Ticks(at), RawEvent::buttons(device, trigger.up())));
    events
}

/// Queue every event of `events` as its own batch.
pub fn replay(backend: &ScriptedBackend, events: &[(Ticks, RawEvent)]) {
    for (at, raw) in events {
        backend.push_batch(*at, vec![*raw]);
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ButtonFlags;
    use std::thread;

    #[test]
    fn test_drain_splits_large_batches() {
        let backend = ScriptedBackend::new(1000);
        let device = DeviceHandle(1);
        backend.push_batch(
            Ticks(7),
            (0..5).map(|i| RawEvent::motion(device, i, 0)).collect(),
        );

        let mut queue = backend.open_queue(2).unwrap();
        let mut out = Vec::new();
        assert_eq!(queue.now(), Ticks(7));
        queue.drain(&mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(backend.pending_batches(), 1);

        out.clear();
        queue.drain(&mut out).unwrap();
        queue.drain(&mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].last_x, 4);
        assert_eq!(backend.now(), Ticks(7));
    }

    #[test]
    fn test_wait_released_by_stop() {
        let backend = ScriptedBackend::new(1000);
        let stop = StopSignal::new();
        let waiter = {
            let backend = backend.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut queue = backend.open_queue(4).unwrap();
                queue.wait(&stop).unwrap();
            })
        };
        stop.fire();
        waiter.join().unwrap();
        assert_eq!(
            backend.registrations(),
            vec![Registration::QueueOpened, Registration::QueueClosed]
        );
    }

    #[test]
    fn test_wait_returns_when_batch_pushed() {
        let backend = ScriptedBackend::new(1000);
        let stop = StopSignal::new();
        let waiter = {
            let backend = backend.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut queue = backend.open_queue(4).unwrap();
                queue.wait(&stop).unwrap();
                let mut out = Vec::new();
                queue.drain(&mut out).unwrap();
                out.len()
            })
        };
        backend.push_batch(Ticks(1), vec![RawEvent::motion(DeviceHandle(1), 1, 1)]);
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_open_failure() {
        let backend = ScriptedBackend::new(1000);
        backend.fail_queue_open(true);
        assert!(backend.open_queue(4).is_err());
        assert!(backend.registrations().is_empty());
    }

    #[test]
    fn test_sweep_shape() {
        let events = sweep(3, 10, TriggerButton::Left);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].0, Ticks(0));
        assert_eq!(events[0].1.buttons, ButtonFlags::LEFT_DOWN);
        assert_eq!(events[4].0, Ticks(40));
        assert_eq!(events[4].1.buttons, ButtonFlags::LEFT_UP);
        assert!(events[1..4].iter().all(|(_, e)| e.buttons.is_empty()));
    }

    #[test]
    fn test_sweep_saturates_large_interval() {
        let events = sweep(2, i64::MAX / 2 + 1, TriggerButton::Left);
        let ticks: Vec<i64> = events.iter().map(|(at, _)| at.0).collect();
        assert_eq!(ticks, vec![0, i64::MAX / 2 + 1, i64::MAX, i64::MAX]);
    }

    #[test]
    fn test_sweep_negative_interval_never_decreases() {
        let events = sweep(3, -5, TriggerButton::Left);
        assert!(events.iter().all(|(at, _)| *at == Ticks(0)));
    }
}
