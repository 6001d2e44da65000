//! Error types shared between client and server.
//!
//! The `StreamError` enum unifies the failure cases of the streaming stack: socket
//! I/O, configuration, channel communication and thread management, allowing crates
//! to propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum StreamError {
    /// I/O error originating from the standard library or sockets.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or inconsistent configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// The OS refused to start a worker thread.
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    /// The peer closed the connection before the expected bytes arrived.
    #[error("Peer disconnected")]
    Disconnected,
}

impl<T> From<crossbeam_channel::SendError<T>> for StreamError {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        StreamError::ChannelSend(err.to_string())
    }
}
