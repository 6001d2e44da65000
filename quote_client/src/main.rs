//! Quote Client — a TCP probe for the quote server. It opens the requested number of
//! connections, checks that each one starts with the header byte, reads whole frames
//! and logs how many frames arrived per reporting interval until Ctrl+C.
//!
//! Usage example (CLI):
//! ```bash
//! quote_client --host 127.0.0.1 --port 10003 --connections 100 --frame-size 512
//! ```
#![warn(missing_docs)]
mod args;
mod receiver;

use crate::args::Args;
use crate::receiver::FrameReceiver;
use clap::Parser;
use crossbeam_channel::{bounded, select, tick};
use log::{error, info};
use quote_common::net::addr;
use quote_common::{Result, StreamError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    if args.frame_size == 0 {
        return Err(StreamError::Config("frame size must be positive".into()));
    }

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| StreamError::Config(format!("cannot install Ctrl+C handler: {}", e)))?;

    let server = addr(args.host.trim(), args.port);
    let received = Arc::new(AtomicU64::new(0));
    let mut closers = Vec::with_capacity(args.connections);
    let mut handles = Vec::with_capacity(args.connections);

    info!("Opening {} connection(s) to {}", args.connections, server);
    for id in 0..args.connections {
        let receiver = FrameReceiver::connect(&server, args.frame_size, Arc::clone(&received))?;
        closers.push(receiver.closer()?);
        handles.push(receiver.spawn(id)?);
    }

    let interval = Duration::from_millis(args.report_interval_ms.max(1));
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                let frames = received.swap(0, Ordering::Relaxed);
                info!("{} frames received", frames);
                if handles.iter().all(|h| h.is_finished()) {
                    info!("All connections closed by the server");
                    break;
                }
            },
            recv(stop_rx) -> _ => break,
        }
    }

    for closer in &closers {
        closer.close();
    }
    let mut total = 0;
    for handle in handles {
        match handle.join() {
            Ok(Ok(frames)) => total += frames,
            Ok(Err(e)) => error!("Connection failed: {}", e),
            Err(_) => error!("Receiver thread panicked"),
        }
    }
    info!("Received {} frames in total", total);
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
