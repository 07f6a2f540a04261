//! Append-only sample storage.
//!
//! The buffer is allocated once with a generous capacity so that growth
//! during an active capture stays exceptional. When it does fill up the
//! capacity doubles; if that allocation fails the sample is dropped instead
//! of interrupting the recording.

use tracing::{debug, warn};

use crate::sample::MotionSample;

/// Default number of preallocated sample slots.
pub const DEFAULT_CAPACITY: usize = 80_000;

/// Growable, append-only store of motion samples.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<MotionSample>,
    limit: Option<usize>,
    reallocations: u64,
    dropped: u64,
}

impl SampleBuffer {
    /// Create a buffer with room for `capacity` samples.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            limit: None,
            reallocations: 0,
            dropped: 0,
        }
    }

    /// Create a buffer that never grows beyond `max_capacity` samples.
    ///
    /// Appends past the ceiling are dropped the same way as appends whose
    /// allocation fails.
    #[must_use]
    pub fn with_limit(capacity: usize, max_capacity: usize) -> Self {
        Self {
            limit: Some(max_capacity),
            ..Self::with_capacity(capacity.min(max_capacity))
        }
    }

    /// Append a sample, doubling the capacity when full.
    ///
    /// Returns `false` if the limit is reached or growth failed, in which
    /// case the sample is dropped.
    pub fn append(&mut self, sample: MotionSample) -> bool {
        let len = self.samples.len();
        if self.limit.is_some_and(|limit| len >= limit) {
            return self.drop_sample(self.samples.capacity(), "capacity limit reached");
        }
        if len == self.samples.capacity() && !self.grow() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    fn grow(&mut self) -> bool {
        let current = self.samples.capacity();
        let doubled = current.saturating_mul(2).max(1);
        let target = self.limit.map_or(doubled, |limit| doubled.min(limit));

        match self.samples.try_reserve_exact(target - self.samples.len()) {
            Ok(()) => {
                self.reallocations += 1;
                debug!(
                    from = current,
                    to = self.samples.capacity(),
                    "Sample buffer grew during capture"
                );
                true
            }
            Err(e) => self.drop_sample(current, &e.to_string()),
        }
    }

    fn drop_sample(&mut self, capacity: usize, reason: &str) -> bool {
        self.dropped += 1;
        warn!(
            capacity,
            dropped = self.dropped,
            reason,
            "Sample buffer growth failed, dropping sample"
        );
        false
    }

    /// Growth ceiling, if any.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Forget all samples while keeping the allocation.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// The recorded samples in acquisition order.
    #[must_use]
    pub fn snapshot(&self) -> &[MotionSample] {
        &self.samples
    }

    /// Number of recorded samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples that fit without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// How many times the buffer has grown since creation.
    #[must_use]
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// How many samples were lost to failed growth since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ButtonFlags, DeviceHandle, Ticks};

    fn sample(n: i32) -> MotionSample {
        MotionSample {
            delta_x: n,
            delta_y: -n,
            timestamp: Ticks(i64::from(n)),
            device: DeviceHandle(1),
            buttons: ButtonFlags::NONE,
        }
    }

    #[test]
    fn test_default_capacity() {
        let buffer = SampleBuffer::default();
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_append_below_capacity_never_grows() {
        let mut buffer = SampleBuffer::with_capacity(64);
        for n in 0..63 {
            assert!(buffer.append(sample(n)));
        }
        assert_eq!(buffer.len(), 63);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.reallocations(), 0);
    }

    #[test]
    fn test_doubling_preserves_order() {
        let mut buffer = SampleBuffer::with_capacity(8);
        for n in 0..9 {
            assert!(buffer.append(sample(n)));
        }
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.reallocations(), 1);
        let xs: Vec<i32> = buffer.snapshot().iter().map(|s| s.delta_x).collect();
        assert_eq!(xs, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut buffer = SampleBuffer::with_capacity(0);
        assert!(buffer.append(sample(1)));
        assert!(buffer.append(sample(2)));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.capacity() >= 2);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buffer = SampleBuffer::with_capacity(4);
        for n in 0..10 {
            buffer.append(sample(n));
        }
        let capacity = buffer.capacity();
        buffer.reset();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_no_drops_on_success() {
        let mut buffer = SampleBuffer::with_capacity(1);
        for n in 0..100 {
            buffer.append(sample(n));
        }
        assert_eq!(buffer.dropped(), 0);
        assert_eq!(buffer.len(), 100);
    }

    #[test]
    fn test_limit_caps_growth() {
        let mut buffer = SampleBuffer::with_limit(2, 3);
        for n in 0..3 {
            assert!(buffer.append(sample(n)));
        }
        assert_eq!(buffer.reallocations(), 1);
        assert_eq!(buffer.dropped(), 0);
        assert!(!buffer.append(sample(3)));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_append_past_limit_drops_sample() {
        let mut buffer = SampleBuffer::with_limit(2, 2);
        assert!(buffer.append(sample(1)));
        assert!(buffer.append(sample(2)));

        assert!(!buffer.append(sample(3)));
        assert!(!buffer.append(sample(4)));

        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.reallocations(), 0);
        let xs: Vec<i32> = buffer.snapshot().iter().map(|s| s.delta_x).collect();
        assert_eq!(xs, vec![1, 2]);
    }

    #[test]
    fn test_reset_after_drops_accepts_again() {
        let mut buffer = SampleBuffer::with_limit(1, 1);
        assert!(buffer.append(sample(1)));
        assert!(!buffer.append(sample(2)));
        buffer.reset();
        assert!(buffer.append(sample(3)));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.dropped(), 1);
        assert_eq!(buffer.limit(), Some(1));
    }
}
