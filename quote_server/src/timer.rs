//! One-shot delayed callbacks on a single timer thread.
//!
//! The event-driven servicer uses this instead of parking a thread per connection
//! while the frame clock runs. Pending entries sit in a min-heap keyed by deadline;
//! the thread sleeps on the command channel until the earliest deadline or a new
//! entry arrives.
//!
//! Jobs run on the timer thread and must not block.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::debug;
use quote_common::{Result, StreamError};

type Job = Box<dyn FnOnce() + Send>;

struct Entry {
    deadline: Instant,
    seq: u64,
    job: Job,
}

// Reversed so the BinaryHeap pops the earliest deadline first; `seq` keeps FIFO order
// for equal deadlines.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Handle to the timer thread. Clones share the thread; it exits once every handle is
/// dropped and the remaining entries have fired.
#[derive(Clone)]
pub struct Timer {
    tx: Sender<(Instant, Job)>,
}

impl Timer {
    /// Spawn the timer thread.
    pub fn start() -> Result<Self> {
        let (tx, rx) = unbounded::<(Instant, Job)>();
        thread::Builder::new()
            .name("frame-timer".into())
            .spawn(move || run(rx))
            .map_err(|e| StreamError::Spawn(e.to_string()))?;
        Ok(Self { tx })
    }

    /// Run `job` on the timer thread once `delay` has elapsed.
    pub fn sleep_then<F>(&self, delay: Duration, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send((Instant::now() + delay, Box::new(job)))
            .map_err(|_| StreamError::ChannelSend("timer thread is gone".into()))
    }
}

fn run(rx: Receiver<(Instant, Job)>) {
    let mut queue: BinaryHeap<Entry> = BinaryHeap::new();
    let mut seq: u64 = 0;
    let mut open = true;

    loop {
        let next = queue.peek().map(|entry| entry.deadline);
        let received = match (next, open) {
            (None, false) => break,
            (None, true) => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            (Some(deadline), true) => rx.recv_deadline(deadline),
            (Some(deadline), false) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                Err(RecvTimeoutError::Timeout)
            }
        };

        match received {
            Ok((deadline, job)) => {
                seq += 1;
                queue.push(Entry { deadline, seq, job });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => open = false,
        }

        let now = Instant::now();
        while queue.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = queue.pop() {
                (entry.job)();
            }
        }
    }
    debug!("Timer thread stopping");
}
