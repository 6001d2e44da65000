//! Fixed pool of threads that run blocking socket writes for the event-driven model.
//!
//! Jobs are queued on an unbounded crossbeam channel and picked up by whichever worker
//! is free. A slow peer ties up one worker for the duration of its write; queued jobs
//! wait behind it.

use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use quote_common::{Result, StreamError};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the worker pool. Workers exit once every handle is dropped and the queue
/// is drained.
#[derive(Clone)]
pub struct IoPool {
    tx: Sender<Job>,
}

impl IoPool {
    /// Spawn `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        for id in 0..threads {
            let rx: Receiver<Job> = rx.clone();
            thread::Builder::new()
                .name(format!("io-worker-{}", id))
                .spawn(move || {
                    for job in rx.iter() {
                        job();
                    }
                    debug!("I/O worker {} stopping", id);
                })
                .map_err(|e| StreamError::Spawn(e.to_string()))?;
        }
        Ok(Self { tx })
    }

    /// Queue `job` for execution on a worker thread.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| StreamError::ChannelSend("I/O pool is gone".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn runs_every_submitted_job() {
        let pool = IoPool::new(3).unwrap();
        let (tx, rx) = unbounded();
        for i in 0..50 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap()).unwrap();
        }
        let mut seen: Vec<i32> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn jobs_run_off_the_submitting_thread() {
        let pool = IoPool::new(2).unwrap();
        let (tx, rx) = unbounded();
        for _ in 0..4 {
            let tx = tx.clone();
            pool.submit(move || tx.send(thread::current().name().map(String::from)).unwrap())
                .unwrap();
        }
        let names: HashSet<_> = (0..4).map(|_| rx.recv().unwrap().unwrap()).collect();
        assert!(names.iter().all(|name| name.starts_with("io-worker-")));
    }
}
