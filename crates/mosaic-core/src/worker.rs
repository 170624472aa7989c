//! A thread pool distributing image requests across workers.
//!
//! Decoding and descriptor extraction are the CPU-bound steps, so the unit
//! of distribution is the whole request. Workers share one read-only
//! [`Quantizer`] handle; the only ordering guarantee is internal to a single
//! request (extraction order into hit file order).

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::Result;
use crate::pipeline::ImageRequest;
use crate::response::ResponseCode;
use crate::Quantizer;

struct Job {
    request: ImageRequest,
    reply: Sender<ResponseCode>,
}

/// A pool of worker threads processing image requests.
pub struct WorkerPool {
    intake: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads (at least one) over a shared quantizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if a thread cannot be spawned.
    pub fn spawn(quantizer: &Quantizer, workers: usize) -> Result<Self> {
        let (intake, jobs) = unbounded::<Job>();
        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let jobs: Receiver<Job> = jobs.clone();
            let quantizer = quantizer.clone();
            let handle = thread::Builder::new()
                .name(format!("mosaic-worker-{worker}"))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        let code = quantizer.process(&job.request);
                        // The submitter may have dropped its receiver.
                        let _ = job.reply.send(code);
                    }
                })?;
            handles.push(handle);
        }
        Ok(Self {
            intake: Some(intake),
            handles,
        })
    }

    /// Queues a request and returns the channel its outcome arrives on.
    ///
    /// Exactly one [`ResponseCode`] is delivered per submitted request. If
    /// the pool is gone before the request runs, the channel disconnects
    /// instead.
    pub fn submit(&self, request: ImageRequest) -> Receiver<ResponseCode> {
        let (reply, outcome) = bounded(1);
        if let Some(intake) = &self.intake {
            let _ = intake.send(Job { request, reply });
        }
        outcome
    }

    /// Closes intake, lets workers drain the queue, and joins them.
    pub fn join(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        // Dropping the sender disconnects the channel; workers finish what
        // is queued and exit their recv loop.
        self.intake.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close_and_join();
    }
}
