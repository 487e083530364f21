use crate::{error::EngineError, worker::Worker};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

/// Fixed-size collection of workers handed out to pending tasks.
///
/// Acquisition moves a worker out of the pool and release moves it back, so
/// a worker can never be held by two callers and the number of simultaneously
/// assigned workers can never exceed the pool's capacity.
#[derive(Debug)]
pub struct WorkerPool {
    idle: Mutex<Vec<Worker>>,
    available: Condvar,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(workers: Vec<Worker>) -> Self {
        let capacity = workers.len();

        Self {
            idle: Mutex::new(workers),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take an idle worker, blocking until one is returned.
    pub fn acquire(&self) -> Worker {
        let mut idle = self.idle.lock();

        loop {
            if let Some(worker) = idle.pop() {
                return worker;
            }

            self.available.wait(&mut idle);
        }
    }

    /// Take an idle worker if one is free right now.
    pub fn try_acquire(&self) -> Option<Worker> {
        self.idle.lock().pop()
    }

    pub fn release(&self, worker: Worker) {
        self.idle.lock().push(worker);
        self.available.notify_one();
    }

    /// Shut down every worker.  Blocks until all assigned workers have been
    /// released, then tears their processes down one by one.
    pub fn shutdown_all(&self) -> Result<(), EngineError> {
        let mut idle = self.idle.lock();

        while idle.len() < self.capacity {
            self.available.wait(&mut idle);
        }

        debug!(capacity = self.capacity, "shutting down worker pool");

        let mut first_error = None;
        for mut worker in idle.drain(..) {
            if let Err(e) = worker.shutdown() {
                error!(error = %e, "worker failed to shut down");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
