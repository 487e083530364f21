use thiserror::Error;

/// Failure taxonomy of the execution engine.
///
/// `Launch` and `Transport` mean the execution substrate itself is broken and
/// always abort the run.  `ChildExit` and `Parse` describe a single bad task;
/// they are carried inside a [`crate::task::TaskResult`] first and only become
/// errors when a controller runs with `ignore_errors` disabled.  `Terminated`
/// is the cooperative unwind after a termination signal.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch '{command}'")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed ({status}){}", fmt_stderr(.stderr))]
    ChildExit {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("cannot parse output of '{command}': {detail}")]
    Parse { command: String, detail: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("termination requested")]
    Terminated,
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(", stderr: {}", stderr.trim_end())
    }
}

impl EngineError {
    /// Whether this error is the cooperative shutdown path rather than a
    /// genuine failure.
    pub fn is_termination(&self) -> bool {
        matches!(self, EngineError::Terminated)
    }
}
