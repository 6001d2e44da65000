//! Completion-token driven servicer.
//!
//! A connection is serviced by a *drive loop* built on [`AsyncResult`]. Every frame
//! cycle is one `begin_write`/`end_write` pair. When a cycle completes synchronously the
//! loop ends it and starts the next one inline, as a plain repeat. When it goes
//! asynchronous the loop returns without blocking and the cycle's callback resumes it
//! later from whatever thread delivered the completion. Either way the stack depth does
//! not grow with the number of frames.
//!
//! Flow of one TCP frame cycle ([`TcpFrameWriter`]):
//! 1. `begin_write` queues the frame write on the [`IoPool`];
//! 2. after the write, the [`Timer`] waits out the frame clock;
//! 3. the timer thread increments the frame counter and completes the token.
//!
//! A failure of any cycle completes the connection's outer token
//! ([`ServiceClientResult`]) with that failure and the loop stops. The failure is only
//! observed by whoever calls [`end_service_client`], which also releases the socket.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use quote_common::{Result, StreamError};

use crate::async_result::{AsyncCallback, AsyncResult, AsyncState};
use crate::io_pool::IoPool;
use crate::model::counter::FrameCounter;
use crate::model::quote::{FrameClock, QuoteFrame};
use crate::service::ServiceContext;
use crate::timer::Timer;

static NEXT_WRITE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Per-cycle data carried by a write token.
#[derive(Debug)]
pub struct WriteTicket {
    /// Process-wide sequence number of the cycle.
    pub seq: u64,
}

impl WriteTicket {
    fn next() -> Self {
        Self {
            seq: NEXT_WRITE_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Token for one frame cycle.
pub type WriteQuoteResult = AsyncResult<(), WriteTicket>;

/// Token for a whole connection.
pub type ServiceClientResult = AsyncResult<(), ConnectionGuard>;

/// Source of frame cycles for a drive loop.
pub trait FrameWriter: Send + Sync + 'static {
    /// Start one cycle. The callback is invoked once the returned token completes.
    fn begin_write(
        &self,
        callback: AsyncCallback<(), WriteTicket>,
    ) -> Result<Arc<WriteQuoteResult>>;

    /// Finish a cycle, surfacing its failure.
    fn end_write(&self, op: &Arc<WriteQuoteResult>) -> Result<()> {
        op.end()
    }
}

/// Owns the connection socket until the outer token is ended.
#[derive(Debug)]
pub struct ConnectionGuard {
    stream: Mutex<Option<Arc<TcpStream>>>,
}

impl ConnectionGuard {
    /// Guard `stream`.
    pub fn new(stream: Arc<TcpStream>) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Shut the socket down and drop it; returns `false` if it was already released.
    pub fn release(&self) -> bool {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stream {
            Some(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    /// Whether the socket is still held.
    pub fn is_held(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Timer and I/O workers shared by every event-driven connection of a server.
#[derive(Clone)]
pub struct EventRuntime {
    /// Frame clock delays.
    pub timer: Timer,
    /// Blocking writes.
    pub pool: IoPool,
    /// Bound on a single stalled write; a peer that stops reading fails its own
    /// connection instead of pinning a pool worker.
    pub write_timeout: Duration,
}

impl EventRuntime {
    /// Start the timer thread and `io_threads` write workers.
    pub fn start(io_threads: usize, write_timeout: Duration) -> Result<Self> {
        Ok(Self {
            timer: Timer::start()?,
            pool: IoPool::new(io_threads)?,
            write_timeout,
        })
    }
}

/// Frame cycles over a TCP socket: write on the I/O pool, then wait out the clock.
pub struct TcpFrameWriter {
    stream: Arc<TcpStream>,
    frame: QuoteFrame,
    clock: FrameClock,
    counter: Arc<FrameCounter>,
    runtime: EventRuntime,
}

impl TcpFrameWriter {
    /// Writer for `stream` using the shared frame, clock and counter of `ctx`.
    pub fn new(stream: Arc<TcpStream>, ctx: &ServiceContext, runtime: EventRuntime) -> Self {
        Self {
            stream,
            frame: ctx.frame.clone(),
            clock: ctx.clock,
            counter: Arc::clone(&ctx.counter),
            runtime,
        }
    }

    /// Start one frame cycle; it always completes asynchronously.
    pub fn begin_write_quote(
        &self,
        callback: AsyncCallback<(), WriteTicket>,
    ) -> Result<Arc<WriteQuoteResult>> {
        let op = AsyncResult::new(Some(callback), None, WriteTicket::next());

        let cycle = Arc::clone(&op);
        let stream = Arc::clone(&self.stream);
        let frame = self.frame.clone();
        let delay = self.clock.interval();
        let counter = Arc::clone(&self.counter);
        let timer = self.runtime.timer.clone();

        self.runtime.pool.submit(move || {
            let mut writer: &TcpStream = &stream;
            if let Err(e) = writer.write_all(frame.as_bytes()) {
                cycle.complete(false, Err(e.into()));
                return;
            }
            let ready = Arc::clone(&cycle);
            let scheduled = timer.sleep_then(delay, move || {
                counter.increment();
                ready.complete(false, Ok(()));
            });
            if let Err(e) = scheduled {
                cycle.complete(false, Err(e));
            }
        })?;

        Ok(op)
    }

    /// Finish a frame cycle.
    pub fn end_write_quote(op: &Arc<WriteQuoteResult>) -> Result<()> {
        op.end()
    }
}

impl FrameWriter for TcpFrameWriter {
    fn begin_write(
        &self,
        callback: AsyncCallback<(), WriteTicket>,
    ) -> Result<Arc<WriteQuoteResult>> {
        self.begin_write_quote(callback)
    }

    fn end_write(&self, op: &Arc<WriteQuoteResult>) -> Result<()> {
        Self::end_write_quote(op)
    }
}

struct DriveLoop<W, X> {
    writer: W,
    outer: Arc<AsyncResult<(), X>>,
}

impl<W, X> DriveLoop<W, X>
where
    W: FrameWriter,
    X: Send + Sync + 'static,
{
    /// Issue cycles until one goes asynchronous or fails.
    ///
    /// `on_initiating_stack` is true only for the first entry, made from inside
    /// `begin_service_client`; a failure there completes the outer token synchronously.
    /// Entries from a callback complete it asynchronously.
    fn run(self: &Arc<Self>, on_initiating_stack: bool) {
        loop {
            let resume = Arc::clone(self);
            let callback: AsyncCallback<(), WriteTicket> =
                Box::new(move |op: &Arc<WriteQuoteResult>| {
                    // synchronous completions are ended inline by the loop itself
                    if op.completed_synchronously() {
                        return;
                    }
                    if resume.finish_cycle(op, false) {
                        resume.run(false);
                    }
                });

            let op = match self.writer.begin_write(callback) {
                Ok(op) => op,
                Err(e) => {
                    self.fail(on_initiating_stack, e);
                    return;
                }
            };
            if !op.completed_synchronously() {
                return;
            }
            if !self.finish_cycle(&op, on_initiating_stack) {
                return;
            }
        }
    }

    fn finish_cycle(&self, op: &Arc<WriteQuoteResult>, on_initiating_stack: bool) -> bool {
        match self.writer.end_write(op) {
            Ok(()) => true,
            Err(e) => {
                self.fail(on_initiating_stack, e);
                false
            }
        }
    }

    fn fail(&self, completed_synchronously: bool, err: StreamError) {
        debug!("Drive loop stopping: {}", err);
        self.outer.complete(completed_synchronously, Err(err));
    }
}

/// Enter the drive loop for `writer`, completing `outer` if a cycle fails.
///
/// Returns once the first cycle goes asynchronous (or the loop fails); the rest of the
/// work continues from completion callbacks.
pub fn drive<W, X>(writer: W, outer: Arc<AsyncResult<(), X>>)
where
    W: FrameWriter,
    X: Send + Sync + 'static,
{
    Arc::new(DriveLoop { writer, outer }).run(true);
}

/// Start servicing `stream`: write the header, then enter the drive loop.
///
/// Never blocks on the connection beyond the runtime's write timeout. Every write on
/// the socket is bounded by that timeout. A header write failure tears the connection
/// down and completes the returned token synchronously with that failure.
pub fn begin_service_client(
    stream: TcpStream,
    ctx: &ServiceContext,
    runtime: &EventRuntime,
    callback: AsyncCallback<(), ConnectionGuard>,
    state: Option<AsyncState>,
) -> Arc<ServiceClientResult> {
    let stream = Arc::new(stream);
    let outer = AsyncResult::new(Some(callback), state, ConnectionGuard::new(Arc::clone(&stream)));

    let header = stream
        .set_write_timeout(Some(runtime.write_timeout))
        .and_then(|()| {
            let mut header: &TcpStream = &stream;
            header.write_all(ctx.frame.header())
        });
    if let Err(e) = header {
        outer.ext().release();
        outer.complete(true, Err(e.into()));
        return outer;
    }

    let writer = TcpFrameWriter::new(stream, ctx, runtime.clone());
    drive(writer, Arc::clone(&outer));
    outer
}

/// Collect the connection's outcome and release its socket.
///
/// # Panics
/// If called twice for the same token.
pub fn end_service_client(op: &Arc<ServiceClientResult>) -> Result<()> {
    let outcome = op.end();
    op.ext().release();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, Sender, unbounded};
    use std::cell::Cell;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use quote_common::net::{read_frame, read_header};

    thread_local! {
        static DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    struct DepthProbe;

    impl DepthProbe {
        fn enter() -> (Self, usize) {
            let depth = DEPTH.with(|d| {
                d.set(d.get() + 1);
                d.get()
            });
            (Self, depth)
        }
    }

    impl Drop for DepthProbe {
        fn drop(&mut self) {
            DEPTH.with(|d| d.set(d.get() - 1));
        }
    }

    /// Scripted writer: `true` completes a cycle synchronously, `false` completes it
    /// from a helper thread. The cycle after the script ends fails.
    struct ScriptedWriter {
        script: Vec<bool>,
        issued: AtomicU64,
        max_depth: Arc<AtomicU64>,
        async_done: Sender<Arc<WriteQuoteResult>>,
    }

    impl FrameWriter for ScriptedWriter {
        fn begin_write(
            &self,
            callback: AsyncCallback<(), WriteTicket>,
        ) -> Result<Arc<WriteQuoteResult>> {
            let (_probe, depth) = DepthProbe::enter();
            self.max_depth.fetch_max(depth as u64, Ordering::SeqCst);

            let op = AsyncResult::new(Some(callback), None, WriteTicket::next());
            let n = self.issued.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script.get(n) {
                Some(true) => op.complete(true, Ok(())),
                Some(false) => self.async_done.send(Arc::clone(&op))?,
                None => op.complete(true, Err(StreamError::Disconnected)),
            }
            Ok(op)
        }
    }

    type Scripted = (ScriptedWriter, Arc<AtomicU64>, Receiver<Arc<WriteQuoteResult>>);

    fn scripted(script: Vec<bool>) -> Scripted {
        let (tx, rx) = unbounded();
        let max_depth = Arc::new(AtomicU64::new(0));
        let writer = ScriptedWriter {
            script,
            issued: AtomicU64::new(0),
            max_depth: Arc::clone(&max_depth),
            async_done: tx,
        };
        (writer, max_depth, rx)
    }

    #[test]
    fn long_synchronous_run_does_not_deepen_the_stack() {
        for frames in [0usize, 1, 10, 10_000] {
            let (writer, max_depth, _rx) = scripted(vec![true; frames]);
            let outer: Arc<AsyncResult<()>> = AsyncResult::new(None, None, ());

            drive(writer, Arc::clone(&outer));

            assert!(outer.is_completed());
            assert!(outer.completed_synchronously());
            assert!(matches!(outer.end(), Err(StreamError::Disconnected)));
            assert_eq!(max_depth.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn resumes_from_callbacks_and_stays_shallow() {
        let mut script = Vec::new();
        for _ in 0..20 {
            script.extend([true, true, false]);
        }
        let (writer, max_depth, rx) = scripted(script);
        let (done_tx, done_rx) = unbounded();
        let outer: Arc<AsyncResult<()>> = AsyncResult::new(
            Some(Box::new(move |op: &Arc<AsyncResult<()>>| {
                done_tx.send(op.completed_synchronously()).unwrap();
            })),
            None,
            (),
        );

        drive(writer, Arc::clone(&outer));
        assert!(!outer.is_completed());

        thread::spawn(move || {
            for op in rx.iter() {
                op.complete(false, Ok(()));
            }
        });

        let completed_synchronously = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!completed_synchronously);
        assert!(matches!(outer.end(), Err(StreamError::Disconnected)));
        assert_eq!(max_depth.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_async_cycle_completes_outer_asynchronously() {
        let (writer, _, rx) = scripted(vec![true, false]);
        let outer: Arc<AsyncResult<()>> = AsyncResult::new(None, None, ());
        drive(writer, Arc::clone(&outer));

        let pending = rx.recv().unwrap();
        pending.complete(false, Err(StreamError::Disconnected));

        assert!(outer.is_completed());
        assert!(!outer.completed_synchronously());
        assert!(outer.end().is_err());
    }

    fn test_context(frame_size: usize, interval_ms: u64) -> ServiceContext {
        ServiceContext::new(
            QuoteFrame::new(frame_size),
            FrameClock::new(Duration::from_millis(interval_ms)),
            Arc::new(FrameCounter::new()),
        )
    }

    #[test]
    fn tcp_writer_completes_asynchronously_and_counts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let ctx = test_context(16, 10);
        let runtime = EventRuntime::start(1, Duration::from_secs(5)).unwrap();
        let writer = TcpFrameWriter::new(Arc::new(stream), &ctx, runtime);

        let (tx, rx) = unbounded();
        let op = writer
            .begin_write_quote(Box::new(move |op: &Arc<WriteQuoteResult>| {
                tx.send(op.completed_synchronously()).unwrap();
            }))
            .unwrap();

        assert!(!rx.recv_timeout(Duration::from_secs(5)).unwrap());
        TcpFrameWriter::end_write_quote(&op).unwrap();
        assert_eq!(ctx.counter.load(), 1);

        let mut frame = [0u8; 16];
        read_frame(&mut client, &mut frame).unwrap();
    }

    #[test]
    fn service_client_streams_until_disconnect_then_releases_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let ctx = test_context(32, 5);
        let runtime = EventRuntime::start(2, Duration::from_secs(5)).unwrap();

        let (tx, rx) = unbounded();
        let op = begin_service_client(
            stream,
            &ctx,
            &runtime,
            Box::new(move |op: &Arc<ServiceClientResult>| {
                let held_before = op.ext().is_held();
                let outcome = end_service_client(op);
                tx.send((held_before, outcome.is_err(), op.ext().is_held())).unwrap();
            }),
            None,
        );
        assert!(!op.is_completed());

        assert_eq!(read_header(&mut client).unwrap(), 1);
        let mut frame = [0u8; 32];
        for _ in 0..3 {
            read_frame(&mut client, &mut frame).unwrap();
        }
        drop(client);

        let (held_before, failed, held_after) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(held_before);
        assert!(failed);
        assert!(!held_after);
        assert!(!op.ext().release());
    }

    #[test]
    fn header_is_sent_once_and_only_whole_frames_follow() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let ctx = test_context(64, 5);
        let runtime = EventRuntime::start(1, Duration::from_secs(5)).unwrap();

        let (tx, rx) = unbounded();
        let op = begin_service_client(
            stream,
            &ctx,
            &runtime,
            Box::new(move |op: &Arc<ServiceClientResult>| {
                tx.send(end_service_client(op).is_err()).unwrap();
            }),
            None,
        );

        let mut received = vec![0u8; 1 + 3 * 64];
        client.read_exact(&mut received).unwrap();
        assert!(op.ext().release());
        client.read_to_end(&mut received).unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(received.len() >= 1 + 3 * 64);
        assert_eq!((received.len() - 1) % 64, 0, "{} bytes received", received.len());
        assert_eq!(ctx.counter.load() as usize, (received.len() - 1) / 64);
    }

    #[test]
    fn header_failure_completes_synchronously_and_releases_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let ctx = test_context(16, 10);
        let runtime = EventRuntime::start(1, Duration::from_secs(5)).unwrap();

        let (tx, rx) = unbounded();
        let op = begin_service_client(
            stream,
            &ctx,
            &runtime,
            Box::new(move |op: &Arc<ServiceClientResult>| {
                tx.send(end_service_client(op).is_err()).unwrap();
            }),
            None,
        );

        assert!(op.is_completed());
        assert!(op.completed_synchronously());
        assert!(rx.try_recv().unwrap());
        assert!(!op.ext().is_held());
        assert_eq!(ctx.counter.load(), 0);
    }
}
