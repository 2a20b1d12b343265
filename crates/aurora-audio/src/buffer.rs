//! Sample queue between the decode side and the output callback.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Interleaved `f32` samples waiting to be played.
///
/// The owner thread pushes decoded audio and the output callback pops it.
/// Both sides hold the lock only long enough to copy a slice.
#[derive(Debug, Default)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
}

/// Shared handle to a [`SampleQueue`].
pub type SharedSampleQueue = Arc<SampleQueue>;

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSampleQueue {
        Arc::new(Self::new())
    }

    /// Append samples to the back of the queue.
    pub fn push(&self, samples: &[f32]) {
        self.samples.lock().extend(samples.iter().copied());
    }

    /// Fill `out` from the front of the queue. Returns how many samples
    /// were copied; the rest of `out` is untouched.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut samples = self.samples.lock();
        let count = out.len().min(samples.len());
        for (slot, sample) in out.iter_mut().zip(samples.drain(..count)) {
            *slot = sample;
        }
        count
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_then_pop_preserves_order() {
        let queue = SampleQueue::new();
        queue.push(&[0.1, 0.2, 0.3]);
        queue.push(&[0.4]);

        let mut out = [0.0f32; 3];
        assert_eq!(queue.pop_into(&mut out), 3);
        assert_eq!(out, [0.1, 0.2, 0.3]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_underrun_leaves_tail_untouched() {
        let queue = SampleQueue::new();
        queue.push(&[0.5]);

        let mut out = [9.0f32; 4];
        assert_eq!(queue.pop_into(&mut out), 1);
        assert_eq!(out, [0.5, 9.0, 9.0, 9.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = SampleQueue::shared();
        queue.push(&[1.0; 16]);
        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
