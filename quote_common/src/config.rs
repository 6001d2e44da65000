//! Server configuration shared by the server binary, its library and the tests.
//!
//! A `ServerConfig` can be built from defaults, loaded from a JSON document (missing
//! fields fall back to defaults) and then adjusted from the command line. Call
//! [`ServerConfig::validate`] before handing it to the server.
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::StreamError;
use crate::net::{DEFAULT_FRAME_SIZE, DEFAULT_HOST, DEFAULT_PORT};
use crate::result::Result;

/// Concurrency model used to service accepted connections.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    Hash,
    Eq,
    PartialEq,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ServingModel {
    /// One OS thread per connection, blocking on the clock and on writes.
    Blocking,
    /// Completion-token driven loop; no thread is parked per connection.
    #[default]
    EventDriven,
}

/// Settings for one server instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub host: IpAddr,
    /// TCP port; `0` lets the OS pick one.
    pub port: u16,
    /// Servicer implementation.
    pub model: ServingModel,
    /// Bytes per quote frame.
    pub frame_size: usize,
    /// Delay before each frame is considered ready.
    pub frame_interval_ms: u64,
    /// Throughput sampling period.
    pub report_interval_ms: u64,
    /// A progress line is logged every this many accepted connections.
    pub progress_every: u64,
    /// Write workers used by the event-driven model.
    pub io_threads: usize,
    /// Longest a single event-driven socket write may stall before the connection fails.
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            model: ServingModel::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            frame_interval_ms: 1000,
            report_interval_ms: 1000,
            progress_every: 100,
            io_threads: 4,
            write_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON document; absent fields keep their default values.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let config: ServerConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(StreamError::Config("frame_size must be positive".into()));
        }
        if self.frame_interval_ms == 0 {
            return Err(StreamError::Config("frame_interval_ms must be positive".into()));
        }
        if self.report_interval_ms == 0 {
            return Err(StreamError::Config("report_interval_ms must be positive".into()));
        }
        if self.progress_every == 0 {
            return Err(StreamError::Config("progress_every must be positive".into()));
        }
        if self.io_threads == 0 {
            return Err(StreamError::Config("io_threads must be positive".into()));
        }
        if self.write_timeout_ms == 0 {
            return Err(StreamError::Config("write_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Socket address built from `host` and `port`.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Frame clock delay.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Stall bound for event-driven writes.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Throughput reporting period.
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
