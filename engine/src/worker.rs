use crate::{
    command::Command,
    context::RunContext,
    error::EngineError,
    process::{self, LaunchOptions, ServiceProcess},
    task::{Task, TaskResult},
};
use itertools::Itertools;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Wraps one external command behind a uniform "submit task, get result"
/// call.
///
/// An ephemeral worker spawns a fresh process per task and reaps it after
/// one input/output cycle.  A persistent worker spawns its bound service
/// once, lazily, and then exchanges one line-framed request/response pair
/// per task over the same pipes, strictly sequentially.
///
/// This is deliberately an enum rather than a trait object; all variants are
/// known and the dispatch sites stay greppable.
#[derive(Debug)]
pub enum Worker {
    Ephemeral {
        options: LaunchOptions,
    },
    Persistent {
        command: Command,
        options: LaunchOptions,
        shutdown_grace: Duration,
        service: Option<ServiceProcess>,
    },
}

impl Worker {
    pub fn ephemeral(options: LaunchOptions) -> Self {
        Self::Ephemeral { options }
    }

    pub fn persistent(command: Command, options: LaunchOptions, shutdown_grace: Duration) -> Self {
        Self::Persistent {
            command,
            options,
            shutdown_grace,
            service: None,
        }
    }

    /// Run one task to completion.
    ///
    /// A task whose process fails (non-zero exit, timeout) comes back as a
    /// result with the failure recorded; deciding whether that aborts the
    /// run is the controller's business, not the worker's.  Once the
    /// termination flag is set no new process is launched and no request is
    /// written.
    pub fn submit(&mut self, task: &Task, ctx: &RunContext) -> Result<TaskResult, EngineError> {
        if ctx.is_terminated() {
            return Err(EngineError::Terminated);
        }

        match self {
            Worker::Ephemeral { options } => process::run_once(task.id, &task.command, &task.input, options),
            Worker::Persistent {
                command,
                options,
                service,
                ..
            } => {
                // Auxiliary commands (samplers, pdfs) differ from the bound
                // service command and always run fork-once.
                if task.command != *command {
                    return process::run_once(task.id, &task.command, &task.input, options);
                }

                if service.is_none() {
                    *service = Some(ServiceProcess::spawn(command, options)?);
                }

                let start = Instant::now();
                let request = task.input.split_whitespace().join(" ");
                let live = service.as_mut().expect("service spawned above");

                match live.exchange(&request, command)? {
                    Some(response) => Ok(TaskResult {
                        id: task.id,
                        stdout: response,
                        stderr: String::new(),
                        status: crate::task::TaskStatus::Ok,
                        runtime: start.elapsed(),
                    }),
                    None => {
                        // The service died mid-conversation.  Report the task
                        // as failed and drop the carcass so a tolerant run
                        // respawns on the next submission.
                        let status = service.take().expect("service spawned above").reap();
                        warn!(command = %command, %status, "persistent service exited early");

                        Ok(TaskResult {
                            id: task.id,
                            stdout: String::new(),
                            stderr: String::new(),
                            status,
                            runtime: start.elapsed(),
                        })
                    }
                }
            }
        }
    }

    /// Release the underlying process, if any.  Persistent services get a
    /// close-pipe-then-wait sequence with a bounded grace period.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        match self {
            Worker::Ephemeral { .. } => Ok(()),
            Worker::Persistent {
                command,
                shutdown_grace,
                service,
                ..
            } => match service.take() {
                Some(service) => {
                    debug!(command = %command, "shutting down persistent service");
                    service.shutdown(*shutdown_grace, command)
                }
                None => Ok(()),
            },
        }
    }
}
