//! Domain models shared by both servicer implementations.
//!
//! - `quote` — the shared `QuoteFrame` payload and the `FrameClock` delay.
//! - `counter` — the process-wide `FrameCounter` drained by the throughput reporter.

pub mod counter;
pub mod quote;
