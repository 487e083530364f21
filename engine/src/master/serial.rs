use crate::{
    context::RunContext,
    error::EngineError,
    pool::WorkerPool,
    task::{Task, TaskResult},
};
use rayon::prelude::*;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};
use tracing::{debug, instrument, trace};

/// In-process master: runs the worker pool on a thread pool of the same
/// size, so every worker can be busy at once and the pool's free list is the
/// only scheduling state.
#[derive(Debug)]
pub struct SerialMaster {
    pool: WorkerPool,
    threads: rayon::ThreadPool,
    ctx: RunContext,
    completed: AtomicU64,
}

impl SerialMaster {
    pub fn new(pool: WorkerPool, ctx: RunContext) -> Result<Self, EngineError> {
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(pool.capacity())
            .build()
            .map_err(|e| EngineError::Transport(format!("failed to build dispatch threads: {e}")))?;

        Ok(Self {
            pool,
            threads,
            ctx,
            completed: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Run a batch of tasks, blocking until every task has a result.
    ///
    /// Results come back in the order the tasks were given, regardless of
    /// completion order.  The termination flag is checked at task boundaries;
    /// once set, no further process is launched and the whole batch resolves
    /// to [`EngineError::Terminated`].
    #[instrument(skip_all, fields(batch = tasks.len()), level = "debug")]
    pub fn dispatch(&self, tasks: Vec<Task>) -> Result<Vec<TaskResult>, EngineError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();

        let outcome: Result<Vec<TaskResult>, EngineError> = self.threads.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    if self.ctx.is_terminated() {
                        return Err(EngineError::Terminated);
                    }

                    let mut worker = self.pool.acquire();
                    let outcome = worker.submit(task, &self.ctx);
                    self.pool.release(worker);

                    trace!(
                        id = task.id,
                        completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1,
                        "task completed"
                    );

                    outcome
                })
                .collect()
        });

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch finished"
        );

        outcome
    }

    pub fn shutdown_all(&self) -> Result<(), EngineError> {
        self.pool.shutdown_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::Command, process::LaunchOptions, worker::Worker};

    fn master(capacity: usize) -> SerialMaster {
        let workers = (0..capacity)
            .map(|_| Worker::ephemeral(LaunchOptions::default()))
            .collect();

        SerialMaster::new(WorkerPool::new(workers), RunContext::new(false, false)).unwrap()
    }

    fn echo_tasks(n: u64) -> Vec<Task> {
        (0..n)
            .map(|i| {
                Task::new(
                    i,
                    Command::new(&format!("echo {i}")).unwrap(),
                    String::new(),
                )
            })
            .collect()
    }

    #[test]
    fn results_preserve_dispatch_order() {
        let master = master(4);
        let results = master.dispatch(echo_tasks(16)).unwrap();

        assert_eq!(results.len(), 16);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.id, i as u64);
            assert_eq!(result.stdout.trim(), i.to_string());
        }
    }

    #[test]
    fn termination_aborts_the_batch() {
        let master = master(2);
        master.ctx.request_termination();

        assert!(matches!(
            master.dispatch(echo_tasks(4)),
            Err(EngineError::Terminated)
        ));
    }

    #[test]
    fn launch_failures_are_fatal() {
        let master = master(2);
        let tasks = vec![Task::new(
            0,
            Command::new("./no-such-binary").unwrap(),
            String::new(),
        )];

        assert!(matches!(
            master.dispatch(tasks),
            Err(EngineError::Launch { .. })
        ));
    }
}
