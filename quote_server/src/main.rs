//! Quote frame streaming server.
//!
//! This binary listens on a TCP socket (loopback:10003 by default) and streams a
//! fixed-size quote frame to every connected client once per frame interval. It wires
//! together three building blocks from the library:
//!
//! - `QuoteServer` — binds the listener and runs the accept loop on a dedicated thread,
//!   handing every connection to the servicer model chosen with `--model`.
//! - `ThroughputReporter` — drains the shared frame counter once per report interval and
//!   logs `N frames/sec`.
//! - `init_logger` — `env_logger` at the level given by `--log-level` (or `RUST_LOG`).
//!
//! The process runs until the accept loop fails or it is killed.
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use log::{error, info};
use quote_common::{Result, StreamError};
use quote_server::acceptor::QuoteServer;
use quote_server::reporter::{LogSink, ThroughputReporter};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);
    let config = args.into_config()?;
    info!("Starting quote server with {:?}", config);

    let server = QuoteServer::bind(config.clone())?;
    let reporter = ThroughputReporter::start(server.counter(), config.report_interval(), LogSink)?;
    let accept_loop = server.spawn()?;

    let outcome = accept_loop
        .join()
        .unwrap_or_else(|_| Err(StreamError::Spawn("accept loop panicked".into())));
    reporter.stop();
    if let Err(e) = &outcome {
        error!("Accept loop failed: {}", e);
    }
    outcome
}

fn init_logger(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .init();
}
