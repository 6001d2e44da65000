//! Frame receiving side of the probe client.
//!
//! Each connection runs on its own thread: read the header byte once, then whole frames
//! until the server goes away or the socket is shut down locally. Every frame bumps a
//! shared counter that the reporting loop in `main` drains.
use log::debug;
use quote_common::net::{read_frame, read_header};
use quote_common::{Result, StreamError};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// One client connection to the quote server.
pub struct FrameReceiver {
    stream: TcpStream,
    frame_size: usize,
    received: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Connect to `addr`.
    pub fn connect(addr: &str, frame_size: usize, received: Arc<AtomicU64>) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self {
            stream,
            frame_size,
            received,
        })
    }

    /// Handle that can shut the connection down from another thread.
    pub fn closer(&self) -> Result<Closer> {
        Ok(Closer(self.stream.try_clone()?))
    }

    /// Read the header, then count frames until the stream ends.
    ///
    /// Returns the number of frames this connection received.
    pub fn run(mut self) -> Result<u64> {
        let header = match read_header(&mut self.stream) {
            Ok(header) => header,
            Err(StreamError::Disconnected) => return Ok(0),
            Err(e) => return Err(e),
        };
        debug!("Header byte {:#04x} from {:?}", header, self.stream.peer_addr());

        let mut frame = vec![0u8; self.frame_size];
        let mut frames = 0;
        loop {
            match read_frame(&mut self.stream, &mut frame) {
                Ok(()) => {
                    frames += 1;
                    self.received.fetch_add(1, Ordering::Relaxed);
                }
                Err(StreamError::Disconnected) => return Ok(frames),
                Err(e) => return Err(e),
            }
        }
    }

    /// Run on a dedicated thread.
    pub fn spawn(self, id: usize) -> Result<JoinHandle<Result<u64>>> {
        thread::Builder::new()
            .name(format!("receiver-{}", id))
            .spawn(move || self.run())
            .map_err(|e| StreamError::Spawn(e.to_string()))
    }
}

/// Shuts a receiver's socket down, ending its loop.
pub struct Closer(TcpStream);

impl Closer {
    /// Close both directions; the receiver sees end of stream.
    pub fn close(&self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
