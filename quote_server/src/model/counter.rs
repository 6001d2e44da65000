//! Process-wide frames-written counter.
//!
//! Every servicer increments the same counter once per frame; the throughput reporter
//! drains it once per interval. There is no per-connection attribution.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate count of frames written since the last [`FrameCounter::take`].
#[derive(Debug, Default)]
pub struct FrameCounter {
    written: AtomicU64,
}

impl FrameCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one written frame.
    pub fn increment(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current value and reset it to zero in one atomic step.
    pub fn take(&self) -> u64 {
        self.written.swap(0, Ordering::AcqRel)
    }

    /// Current value without resetting.
    pub fn load(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn take_resets_to_zero() {
        let counter = FrameCounter::new();
        counter.increment();
        counter.increment();
        assert_eq!(counter.take(), 2);
        assert_eq!(counter.load(), 0);
        assert_eq!(counter.take(), 0);
    }

    #[test]
    fn concurrent_increments_are_never_lost_or_double_counted() {
        let counter = Arc::new(FrameCounter::new());
        let mut drained = 0;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for _ in 0..100 {
            drained += counter.take();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        drained += counter.take();
        assert_eq!(drained, 40_000);
    }
}
