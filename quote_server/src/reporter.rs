//! Throughput reporter.
//!
//! A background thread drains the shared frame counter once per interval and hands the
//! sample to a [`ThroughputSink`]. Samples never accumulate across intervals: each one is
//! the number of frames written since the previous sample.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use log::info;
use quote_common::{Result, StreamError};

use crate::model::counter::FrameCounter;

/// Destination of throughput samples.
pub trait ThroughputSink: Send + 'static {
    /// Receive the frames written during the last `interval`.
    fn report(&mut self, frames: u64, interval: Duration);
}

/// Logs one `N frames/sec` line per sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ThroughputSink for LogSink {
    fn report(&mut self, frames: u64, interval: Duration) {
        let per_sec = frames as f64 / interval.as_secs_f64();
        info!("{:.0} frames/sec", per_sec);
    }
}

impl ThroughputSink for Sender<u64> {
    fn report(&mut self, frames: u64, _interval: Duration) {
        let _ = self.send(frames);
    }
}

/// Spawns the sampling thread.
pub struct ThroughputReporter;

impl ThroughputReporter {
    /// Sample `counter` every `interval` into `sink` until the handle is stopped.
    pub fn start<S: ThroughputSink>(
        counter: Arc<FrameCounter>,
        interval: Duration,
        mut sink: S,
    ) -> Result<ReporterHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("throughput-reporter".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => sink.report(counter.take(), interval),
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .map_err(|e| StreamError::Spawn(e.to_string()))?;
        Ok(ReporterHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Running reporter; dropping it stops the thread.
pub struct ReporterHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    /// Stop sampling and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // disconnecting the channel wakes the select
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
