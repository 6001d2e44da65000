//! Command-line arguments for the quote client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use quote_common::net::{DEFAULT_FRAME_SIZE, DEFAULT_PORT};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server IP address (IPv4 or IPv6) where the quote server is running.
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server TCP port.
    #[clap(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of simultaneous connections to open.
    #[clap(long, default_value_t = 1)]
    pub connections: usize,

    /// Expected frame size in bytes.
    #[clap(long, default_value_t = DEFAULT_FRAME_SIZE)]
    pub frame_size: usize,

    /// How often to log the received-frames line, in milliseconds.
    #[clap(long, default_value_t = 1000)]
    pub report_interval_ms: u64,
}
