use crate::command::Command;
use std::{fmt, time::Duration};

/// One unit of work: a command to invoke and the encoded input record fed to
/// its standard input.  A task is consumed by exactly one worker and matched
/// to its [`TaskResult`] by id.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: u64,
    pub command: Command,
    pub input: String,
}

impl Task {
    pub fn new(id: u64, command: Command, input: String) -> Self {
        Self { id, command, input }
    }
}

/// How the invoked process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Exited with status zero.
    Ok,
    /// Exited with a non-zero status.
    Exited(i32),
    /// Killed by a signal.
    Signaled(i32),
    /// Ran past the configured task timeout and was killed.
    TimedOut,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Ok => write!(f, "exit status 0"),
            TaskStatus::Exited(code) => write!(f, "exit status {code}"),
            TaskStatus::Signaled(signal) => write!(f, "killed by signal {signal}"),
            TaskStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Decoded outcome of one task.  Produced by a worker, consumed once by the
/// issuing controller.
///
/// A failed invocation is a result with a non-`Ok` status, not an error; the
/// controller decides whether that is tolerated or fatal.
#[derive(Clone, Debug)]
pub struct TaskResult {
    pub id: u64,
    pub stdout: String,
    pub stderr: String,
    pub status: TaskStatus,
    pub runtime: Duration,
}

impl TaskResult {
    pub fn is_ok(&self) -> bool {
        self.status == TaskStatus::Ok
    }
}
