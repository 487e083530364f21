use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::debug;

/// Execution context created once at run start and threaded through the
/// master and controllers.
///
/// Everything in here is read-only for the lifetime of a run except the
/// termination flag, which is flipped at most once (by a signal or by the
/// top-level error path) and never reset.
#[derive(Clone, Debug)]
pub struct RunContext {
    terminated: Arc<AtomicBool>,
    pub ignore_errors: bool,
    pub discard_child_stderr: bool,
}

impl RunContext {
    pub fn new(ignore_errors: bool, discard_child_stderr: bool) -> Self {
        Self {
            terminated: Arc::new(AtomicBool::new(false)),
            ignore_errors,
            discard_child_stderr,
        }
    }

    /// Register SIGINT/SIGTERM to set the termination flag.
    ///
    /// Repeated signals are idempotent; the flag only ever goes from false to
    /// true.
    pub fn register_signals(&self) -> std::io::Result<()> {
        signal_hook::flag::register(SIGINT, Arc::clone(&self.terminated))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&self.terminated))?;
        debug!("registered termination signal handlers");

        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Flip the termination flag from inside the process, e.g. from tests or
    /// the fatal-error path in `main`.
    pub fn request_termination(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
