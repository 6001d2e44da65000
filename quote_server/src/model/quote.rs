//! Quote frame source and frame clock.
//!
//! A `QuoteFrame` is the payload sent to clients: an opaque, fixed-size byte buffer
//! built once at startup and shared read-only by every connection. The `FrameClock`
//! models a slow upstream feed: a fixed delay that passes before each frame is ready.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quote_common::net::HEADER_LEN;

/// Fill value for every byte of the frame.
pub const FRAME_FILL: u8 = 1;

/// Immutable quote payload shared across connections.
#[derive(Debug, Clone)]
pub struct QuoteFrame {
    bytes: Arc<[u8]>,
}

impl QuoteFrame {
    /// Build a frame of `size` bytes, all equal to [`FRAME_FILL`].
    ///
    /// `size` must be at least [`HEADER_LEN`]; the header is cut from the frame itself.
    pub fn new(size: usize) -> Self {
        debug_assert!(size >= HEADER_LEN);
        Self {
            bytes: vec![FRAME_FILL; size].into(),
        }
    }

    /// Full frame body.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Per-connection header, the leading bytes of the frame.
    pub fn header(&self) -> &[u8] {
        &self.bytes[..HEADER_LEN]
    }

    /// Frame size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false` for a valid frame.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fixed latency inserted before each frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    interval: Duration,
}

impl FrameClock {
    /// Create a clock ticking once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Delay before the next frame.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block the calling thread until the next frame is ready.
    pub fn wait(&self) {
        thread::sleep(self.interval);
    }
}
