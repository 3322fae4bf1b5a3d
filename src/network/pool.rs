//! Worker Pool
//!
//! Fixed set of threads fed from a bounded task queue.
//!
//! ## Backpressure
//! - `Block`: `submit` waits for queue space
//! - `Reject`: `submit` fails with `PoolSaturated` when the queue is full
//!
//! Panics inside a task are caught on the worker and reported through the
//! task's handle; the worker thread survives.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::config::Backpressure;
use crate::error::{MarinaError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded worker pool
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    policy: Backpressure,
}

impl WorkerPool {
    /// Spawn `threads` workers sharing a queue of `queue_capacity` slots
    pub fn new(
        name: impl Into<String>,
        threads: usize,
        queue_capacity: usize,
        policy: Backpressure,
    ) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = channel::bounded::<Job>(queue_capacity);

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            name,
            sender: Some(sender),
            workers,
            policy,
        })
    }

    /// Queue a task and return a handle to its result
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(MarinaError::PoolClosed)?;
        let (result_tx, result_rx) = channel::bounded(1);

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            // The submitter may have stopped waiting; nothing to do then
            let _ = result_tx.send(outcome);
        });

        match self.policy {
            Backpressure::Block => sender.send(job).map_err(|_| MarinaError::PoolClosed)?,
            Backpressure::Reject => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => MarinaError::PoolSaturated(self.name.clone()),
                TrySendError::Disconnected(_) => MarinaError::PoolClosed,
            })?,
        }

        Ok(TaskHandle { receiver: result_rx })
    }

    /// Tasks waiting in the queue (not yet picked up by a worker)
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop intake, drain queued tasks, and join the workers
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Worker of pool '{}' exited abnormally", self.name);
            }
        }
        tracing::trace!("Worker pool '{}' shut down", self.name);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pending result of a submitted task
pub struct TaskHandle<T> {
    receiver: Receiver<std::result::Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes
    pub fn wait(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(MarinaError::TaskPanicked(message)),
            Err(_) => Err(MarinaError::PoolClosed),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
