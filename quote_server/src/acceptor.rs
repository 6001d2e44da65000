//! Accept loop.
//!
//! A `QuoteServer` owns the listening socket and the state shared by its connections.
//! Its accept loop runs on a single thread and hands every accepted connection to
//! exactly one servicer of the configured model without waiting on it:
//! - `blocking` — a dedicated thread per connection;
//! - `event-driven` — `begin_service_client`, continued entirely from callbacks.
//!
//! Failing to bind, to accept, or to start a servicer ends the loop with an error.
//! Failures inside a running servicer only end that connection.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info};
use quote_common::{Result, ServerConfig, ServingModel, StreamError};

use crate::async_result::AsyncState;
use crate::blocking;
use crate::event_driven::{self, EventRuntime, ServiceClientResult};
use crate::model::counter::FrameCounter;
use crate::model::quote::{FrameClock, QuoteFrame};
use crate::service::ServiceContext;

/// Quote streaming server bound to its listening socket.
pub struct QuoteServer {
    /// The underlying TCP listening socket.
    listener: TcpListener,
    config: ServerConfig,
    ctx: ServiceContext,
    runtime: Option<EventRuntime>,
}

impl QuoteServer {
    /// Validate `config`, bind the listener and prepare the shared state.
    ///
    /// The timer and I/O workers are only started for the event-driven model.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr())?;
        let ctx = ServiceContext::new(
            QuoteFrame::new(config.frame_size),
            FrameClock::new(config.frame_interval()),
            Arc::new(FrameCounter::new()),
        );
        let runtime = match config.model {
            ServingModel::Blocking => None,
            ServingModel::EventDriven => Some(EventRuntime::start(config.io_threads, config.write_timeout())?),
        };
        info!(
            "Quote server bound to {} ({} model, {} byte frames every {:?})",
            listener.local_addr()?,
            config.model,
            config.frame_size,
            config.frame_interval()
        );
        Ok(Self {
            listener,
            config,
            ctx,
            runtime,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Counter of frames written by every connection of this server.
    pub fn counter(&self) -> Arc<FrameCounter> {
        Arc::clone(&self.ctx.counter)
    }

    /// Run the accept loop on the calling thread; only returns on a fatal error.
    pub fn run(self) -> Result<()> {
        let mut accepted: u64 = 0;
        loop {
            let (stream, peer) = self.listener.accept()?;
            accepted += 1;
            if accepted % self.config.progress_every == 0 {
                info!("{} accepted...", accepted);
            }
            debug!("Accepted connection from {}", peer);
            self.start_servicer(stream, peer)?;
        }
    }

    /// Run the accept loop on its own thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("accept-loop".into())
            .spawn(move || self.run())
            .map_err(|e| StreamError::Spawn(e.to_string()))
    }

    fn start_servicer(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        match &self.runtime {
            None => {
                blocking::spawn_servicer(stream, peer, self.ctx.clone())?;
            }
            Some(runtime) => {
                let errors = Arc::clone(&self.ctx.errors);
                let state: AsyncState = Arc::new(peer);
                event_driven::begin_service_client(
                    stream,
                    &self.ctx,
                    runtime,
                    Box::new(move |op: &Arc<ServiceClientResult>| {
                        if let Err(e) = event_driven::end_service_client(op) {
                            errors.report(peer, &e);
                        }
                    }),
                    Some(state),
                );
            }
        }
        Ok(())
    }
}
