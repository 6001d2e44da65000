//!
//! Common types and utilities shared by the quote server and client.
//!
//! This crate aggregates:
//! - `error` — unified error type `StreamError` used across the workspace.
//! - `result` — handy `Result<T, StreamError>` alias.
//! - `config` — server configuration and the serving model selector.
//! - `net` — networking constants and wire helpers for the header byte and frames.
#![warn(missing_docs)]
pub mod config;
pub mod error;
pub mod net;
pub mod result;

pub use config::{ServerConfig, ServingModel};
pub use error::StreamError;
pub use result::Result;
