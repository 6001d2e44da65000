//! Command-line arguments for the quote server.
//!
//! Values given on the command line override the JSON config file, which in turn
//! overrides the built-in defaults.
use std::fs::File;
use std::io::BufReader;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use quote_common::{Result, ServerConfig, ServingModel};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// JSON file with server settings.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[clap(long)]
    pub host: Option<IpAddr>,

    /// TCP port to listen on.
    #[clap(long)]
    pub port: Option<u16>,

    /// Servicer model.
    #[clap(long, value_enum)]
    pub model: Option<ServingModel>,

    /// Bytes per quote frame.
    #[clap(long)]
    pub frame_size: Option<usize>,

    /// Delay before each frame, in milliseconds.
    #[clap(long)]
    pub frame_interval_ms: Option<u64>,

    /// Throughput sampling period, in milliseconds.
    #[clap(long)]
    pub report_interval_ms: Option<u64>,

    /// Log a progress line every this many accepted connections.
    #[clap(long)]
    pub progress_every: Option<u64>,

    /// Write workers for the event-driven model.
    #[clap(long)]
    pub io_threads: Option<usize>,

    /// Longest an event-driven write may stall, in milliseconds.
    #[clap(long)]
    pub write_timeout_ms: Option<u64>,

    /// Log level: error, warn, info, debug, trace.
    #[clap(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Merge the config file (if any) with command-line overrides.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_reader(BufReader::new(File::open(path)?))?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
        if let Some(ms) = self.frame_interval_ms {
            config.frame_interval_ms = ms;
        }
        if let Some(ms) = self.report_interval_ms {
            config.report_interval_ms = ms;
        }
        if let Some(every) = self.progress_every {
            config.progress_every = every;
        }
        if let Some(threads) = self.io_threads {
            config.io_threads = threads;
        }
        if let Some(ms) = self.write_timeout_ms {
            config.write_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}
