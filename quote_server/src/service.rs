//! State shared by every connection servicer of one server instance.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};

use crate::model::counter::FrameCounter;
use crate::model::quote::{FrameClock, QuoteFrame};

/// Logs only the first connection failure of the process lifetime.
///
/// Later failures still end their own connection but are logged at debug level.
#[derive(Debug, Default)]
pub struct ErrorLatch {
    tripped: AtomicBool,
}

impl ErrorLatch {
    /// Create an untripped latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection failure; returns `true` for the one that got logged.
    pub fn report<E: Display>(&self, peer: SocketAddr, err: &E) -> bool {
        let first = self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            error!("server ERROR: connection {} failed: {}", peer, err);
        } else {
            debug!("Connection {} failed: {}", peer, err);
        }
        first
    }

    /// Whether any failure has been reported.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}

/// Frame, clock, counter and error latch handed to each servicer.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Payload written once per clock tick.
    pub frame: QuoteFrame,
    /// Delay before each frame.
    pub clock: FrameClock,
    /// Frames written since the last throughput sample.
    pub counter: Arc<FrameCounter>,
    /// First-failure log guard.
    pub errors: Arc<ErrorLatch>,
}

impl ServiceContext {
    /// Bundle the shared state.
    pub fn new(frame: QuoteFrame, clock: FrameClock, counter: Arc<FrameCounter>) -> Self {
        Self {
            frame,
            clock,
            counter,
            errors: Arc::new(ErrorLatch::new()),
        }
    }
}
