//! Thread-per-connection servicer.
//!
//! Each accepted connection gets a dedicated OS thread that writes the header once,
//! then loops: wait out the frame clock, write the frame, count it. The loop only ends
//! when a write fails, which includes the peer going away.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};

use log::debug;
use quote_common::{Result, StreamError};

use crate::service::ServiceContext;

/// Stream frames to `stream` until a write fails; never returns `Ok`.
pub fn serve_client<W: Write>(stream: &mut W, ctx: &ServiceContext) -> Result<()> {
    stream.write_all(ctx.frame.header())?;
    loop {
        ctx.clock.wait();
        stream.write_all(ctx.frame.as_bytes())?;
        ctx.counter.increment();
    }
}

/// Start a dedicated servicer thread for `stream`.
///
/// A failure to spawn the thread is returned to the caller; failures while serving
/// stay on the servicer thread and are routed through the context's error latch.
pub fn spawn_servicer(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: ServiceContext,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("client-{}", peer))
        .spawn(move || {
            debug!("Servicing {} on a dedicated thread", peer);
            if let Err(e) = serve_client(&mut stream, &ctx) {
                ctx.errors.report(peer, &e);
            }
            let _ = stream.shutdown(Shutdown::Both);
            debug!("Servicer thread for {} finished", peer);
        })
        .map_err(|e| StreamError::Spawn(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::counter::FrameCounter;
    use crate::model::quote::{FrameClock, QuoteFrame};
    use quote_common::net::{read_frame, read_header};
    use std::io::{self, ErrorKind};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    /// Accepts a fixed number of writes, then fails like a reset connection.
    struct LimitedWriter {
        writes: Vec<Vec<u8>>,
        limit: usize,
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes.len() == self.limit {
                return Err(io::Error::new(ErrorKind::ConnectionReset, "peer reset"));
            }
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context(frame_size: usize, interval_ms: u64) -> ServiceContext {
        ServiceContext::new(
            QuoteFrame::new(frame_size),
            FrameClock::new(Duration::from_millis(interval_ms)),
            Arc::new(FrameCounter::new()),
        )
    }

    #[test]
    fn header_precedes_frames_and_failure_ends_the_loop() {
        let ctx = context(32, 1);
        let mut writer = LimitedWriter {
            writes: Vec::new(),
            limit: 4,
        };

        let err = serve_client(&mut writer, &ctx).unwrap_err();

        assert!(matches!(err, StreamError::Io(ref e) if e.kind() == ErrorKind::ConnectionReset));
        assert_eq!(writer.writes[0].len(), 1);
        assert!(writer.writes[1..].iter().all(|w| w.len() == 32));
        assert_eq!(ctx.counter.take(), 3);
    }

    #[test]
    fn failing_header_writes_no_frames() {
        let ctx = context(8, 1);
        let mut writer = LimitedWriter {
            writes: Vec::new(),
            limit: 0,
        };
        assert!(serve_client(&mut writer, &ctx).is_err());
        assert_eq!(ctx.counter.load(), 0);
    }

    #[test]
    fn servicer_thread_streams_and_exits_on_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = context(64, 5);

        let mut client = TcpStream::connect(addr).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        let handle = spawn_servicer(stream, peer, ctx.clone()).unwrap();

        read_header(&mut client).unwrap();
        let mut frame = [0u8; 64];
        read_frame(&mut client, &mut frame).unwrap();
        read_frame(&mut client, &mut frame).unwrap();
        drop(client);

        handle.join().unwrap();
        assert!(ctx.errors.is_tripped());
    }
}
