use crate::{command::Command, error::EngineError, task::TaskResult, task::TaskStatus};
use nix::{sys::signal, unistd::Pid};
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    process::{Child, ChildStdin, ChildStdout, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Redirection and timing knobs for launched processes.
#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    /// Discard the child's standard error instead of capturing it.
    pub discard_stderr: bool,
    /// Kill one-shot tasks that run longer than this.
    pub timeout: Option<Duration>,
}

/// Run a command to completion: spawn it, feed `input` to its standard
/// input, wait for it to exit and harvest its output streams.
///
/// A non-zero exit or a timeout is recorded in the returned result, not
/// raised; only a failure of the substrate itself (the program cannot be
/// spawned or waited on) is an error.
pub fn run_once(
    id: u64,
    command: &Command,
    input: &str,
    options: &LaunchOptions,
) -> Result<TaskResult, EngineError> {
    let start = Instant::now();
    debug!(command = %command, "spawning task process");

    let mut child = std::process::Command::new(command.program())
        .args(command.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if options.discard_stderr {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .spawn()
        .map_err(|e| launch_error(command, e))?;

    feed_stdin(&mut child, input, command)?;

    let status = match options.timeout {
        Some(limit) => match child
            .wait_timeout(limit)
            .map_err(|e| launch_error(command, e))?
        {
            Some(status) => exit_status(status),
            None => {
                warn!(command = %command, "task ran past its timeout, killing");
                let _ = child.kill();
                let _ = child.wait();
                TaskStatus::TimedOut
            }
        },
        None => exit_status(child.wait().map_err(|e| launch_error(command, e))?),
    };

    let stdout = drain(child.stdout.take(), command)?;
    let stderr = drain(child.stderr.take(), command)?;

    debug!(
        command = %command,
        elapsed_us = start.elapsed().as_micros() as u64,
        status = %status,
        "task process finished"
    );

    Ok(TaskResult {
        id,
        stdout,
        stderr,
        status,
        runtime: start.elapsed(),
    })
}

/// A long-lived external process serving many tasks over one pipe pair.
///
/// The caller drives strict request/response cycles with [`exchange`]; the
/// child is expected to answer every request line with exactly one output
/// line and to exit once its standard input closes.
///
/// [`exchange`]: ServiceProcess::exchange
#[derive(Debug)]
pub struct ServiceProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ServiceProcess {
    /// Service stderr cannot be captured per task; it is either discarded or
    /// shares the engine's own standard error.
    pub fn spawn(command: &Command, options: &LaunchOptions) -> Result<Self, EngineError> {
        let mut child = std::process::Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if options.discard_stderr {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .spawn()
            .map_err(|e| launch_error(command, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error(command, io::Error::other("no stdin pipe")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(command, io::Error::other("no stdout pipe")))?;

        debug!(command = %command, pid = child.id(), "spawned service process");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// Write one request line and block reading one response line.
    ///
    /// Returns `Ok(None)` if the child closed its end of the pipes, meaning
    /// it exited early; the caller should reap it to learn the exit status.
    pub fn exchange(
        &mut self,
        request: &str,
        command: &Command,
    ) -> Result<Option<String>, EngineError> {
        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None => return Ok(None),
        };

        let write = stdin
            .write_all(request.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush());
        match write {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(None),
            Err(e) => return Err(launch_error(command, e)),
        }

        let mut line = String::new();
        let count = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| launch_error(command, e))?;

        if count == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim_end_matches('\n').to_string()))
    }

    /// Wait for an already-dead child and report how it ended.
    pub fn reap(mut self) -> TaskStatus {
        match self.child.wait() {
            Ok(status) => exit_status(status),
            Err(_) => TaskStatus::Exited(-1),
        }
    }

    /// Close the request pipe, then wait for a clean exit within `grace`,
    /// escalating to SIGTERM and finally SIGKILL.
    pub fn shutdown(mut self, grace: Duration, command: &Command) -> Result<(), EngineError> {
        drop(self.stdin.take());

        if self.wait_within(grace, command)? {
            return Ok(());
        }

        warn!(command = %command, "service did not exit after close, sending SIGTERM");
        let _ = signal::kill(Pid::from_raw(self.child.id() as i32), signal::Signal::SIGTERM);

        if self.wait_within(grace, command)? {
            return Ok(());
        }

        warn!(command = %command, "service survived SIGTERM, killing");
        let _ = self.child.kill();
        self.child.wait().map_err(|e| launch_error(command, e))?;

        Ok(())
    }

    fn wait_within(&mut self, grace: Duration, command: &Command) -> Result<bool, EngineError> {
        Ok(self
            .child
            .wait_timeout(grace)
            .map_err(|e| launch_error(command, e))?
            .is_some())
    }
}

fn exit_status(status: std::process::ExitStatus) -> TaskStatus {
    use std::os::unix::process::ExitStatusExt;

    if status.success() {
        TaskStatus::Ok
    } else if let Some(code) = status.code() {
        TaskStatus::Exited(code)
    } else {
        TaskStatus::Signaled(status.signal().unwrap_or(0))
    }
}

fn feed_stdin(child: &mut Child, input: &str, command: &Command) -> Result<(), EngineError> {
    // Dropping the handle closes the pipe, which is the end-of-input marker
    // for the child.
    let mut stdin = match child.stdin.take() {
        Some(stdin) => stdin,
        None => return Ok(()),
    };

    match stdin.write_all(input.as_bytes()) {
        Ok(()) => Ok(()),
        // The child exited or closed its input before reading everything; its
        // exit status carries the verdict.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(launch_error(command, e)),
    }
}

fn drain(pipe: Option<impl Read>, command: &Command) -> Result<String, EngineError> {
    let mut buffer = String::new();

    if let Some(mut pipe) = pipe {
        pipe.read_to_string(&mut buffer)
            .map_err(|e| launch_error(command, e))?;
    }

    Ok(buffer)
}

fn launch_error(command: &Command, source: io::Error) -> EngineError {
    EngineError::Launch {
        command: command.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LaunchOptions {
        LaunchOptions::default()
    }

    #[test]
    fn captures_stdout_and_status() {
        let command = Command::new("echo hello").unwrap();
        let result = run_once(1, &command, "", &options()).unwrap();

        assert_eq!(result.stdout, "hello\n");
        assert!(result.is_ok());
    }

    #[test]
    fn records_nonzero_exit_with_stderr() {
        let command = Command::new("sh -c 'echo broken >&2; exit 3'").unwrap();
        let result = run_once(1, &command, "", &options()).unwrap();

        assert_eq!(result.status, TaskStatus::Exited(3));
        assert_eq!(result.stderr, "broken\n");
    }

    #[test]
    fn discards_stderr_on_request() {
        let command = Command::new("sh -c 'echo broken >&2; exit 3'").unwrap();
        let opts = LaunchOptions {
            discard_stderr: true,
            ..options()
        };
        let result = run_once(1, &command, "", &opts).unwrap();

        assert_eq!(result.stderr, "");
    }

    #[test]
    fn tolerates_children_ignoring_stdin() {
        let command = Command::new("echo 0").unwrap();
        let input = "3.5 ".repeat(1000);
        let result = run_once(1, &command, &input, &options()).unwrap();

        assert!(result.is_ok());
        assert_eq!(result.stdout, "0\n");
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let command = Command::new("./definitely-not-a-program").unwrap();

        assert!(matches!(
            run_once(1, &command, "", &options()),
            Err(EngineError::Launch { .. })
        ));
    }

    #[test]
    fn kills_tasks_past_their_timeout() {
        let command = Command::new("sleep 5").unwrap();
        let opts = LaunchOptions {
            timeout: Some(Duration::from_millis(50)),
            ..options()
        };

        let start = Instant::now();
        let result = run_once(1, &command, "", &opts).unwrap();

        assert_eq!(result.status, TaskStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn service_answers_requests_in_order() {
        let command = Command::new("cat").unwrap();
        let mut service = ServiceProcess::spawn(&command, &options()).unwrap();

        for request in ["first 1", "second 2", "third 3"] {
            let response = service.exchange(request, &command).unwrap();
            assert_eq!(response.as_deref(), Some(request));
        }

        service
            .shutdown(Duration::from_secs(5), &command)
            .unwrap();
    }

    #[test]
    fn exchange_reports_a_dead_service() {
        let command = Command::new("sh -c 'read line; exit 7'").unwrap();
        let mut service = ServiceProcess::spawn(&command, &options()).unwrap();

        assert_eq!(service.exchange("one", &command).unwrap(), None);
        assert_eq!(service.reap(), TaskStatus::Exited(7));
    }
}
