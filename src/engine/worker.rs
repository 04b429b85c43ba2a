//! Single-thread FIFO worker that serializes engine side effects.

use std::sync::mpsc::{self, Sender};
use std::thread;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated thread draining a FIFO queue of jobs.
///
/// Jobs run one at a time in submission order. The thread exits once the
/// worker is dropped and the queue is drained. A panicking job takes the
/// thread down with it; later submissions are logged and discarded.
pub(crate) struct Worker {
    sender: Sender<Job>,
}

impl Worker {
    pub(crate) fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                job();
            }
        })?;
        Ok(Self { sender })
    }

    pub(crate) fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            warn!("state worker is gone, dropping queued task");
        }
    }
}
