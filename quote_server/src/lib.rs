//! Quote frame streaming server.
//!
//! Every connected client receives one header byte, then a fixed-size quote frame once
//! per frame clock tick, forever, until it disconnects. Two interchangeable servicer
//! models exist:
//!
//! - [`blocking`] — one OS thread per connection, sleeping on the clock and blocking on
//!   writes.
//! - [`event_driven`] — a drive loop over the two-phase [`async_result::AsyncResult`]
//!   token. Writes run on a small [`io_pool::IoPool`], clock delays on a single
//!   [`timer::Timer`] thread, and the loop resumes from completion callbacks, so no
//!   thread is parked per connection and stack depth stays bounded.
//!
//! [`acceptor::QuoteServer`] binds the listener and runs the accept loop;
//! [`reporter::ThroughputReporter`] samples the shared frame counter.
//!
//! ```no_run
//! use quote_common::ServerConfig;
//! use quote_server::acceptor::QuoteServer;
//! use quote_server::reporter::{LogSink, ThroughputReporter};
//!
//! fn main() -> quote_common::Result<()> {
//!     let config = ServerConfig::default();
//!     let server = QuoteServer::bind(config.clone())?;
//!     let interval = config.report_interval();
//!     let _reporter = ThroughputReporter::start(server.counter(), interval, LogSink)?;
//!     server.run()
//! }
//! ```
#![warn(missing_docs)]

pub mod acceptor;
pub mod async_result;
pub mod blocking;
pub mod event_driven;
pub mod io_pool;
pub mod model;
pub mod reporter;
pub mod service;
pub mod timer;
