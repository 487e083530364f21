mod rejection;
mod smc;
mod sweep;

pub use rejection::RejectionController;
pub use smc::SmcController;
pub use sweep::SweepController;

use crate::{
    command::Command,
    config::{AlgorithmConfig, EngineConfig},
    error::EngineError,
    master::Masters,
    task::{Task, TaskResult},
};
use std::io;
use tracing::{info, warn};

/// What a controller wants after one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Continue,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Configuring,
    Running,
    Completed,
    Aborted,
}

/// All controller variants.  A controller owns its commands, generates every
/// task, interprets every result and decides termination; it talks to the
/// master's dispatch surface and nothing below it.
pub enum Controllers {
    Sweep(SweepController),
    Rejection(RejectionController),
    Smc(SmcController),
}

impl Controllers {
    pub fn from_config(config: &EngineConfig) -> Self {
        let batch = config.pool.size.max(1);

        match &config.algorithm {
            AlgorithmConfig::Sweep(algorithm) => Controllers::Sweep(SweepController::new(
                algorithm.clone(),
                config.ignore_errors,
            )),
            AlgorithmConfig::Rejection(algorithm) => Controllers::Rejection(
                RejectionController::new(algorithm.clone(), batch, config.ignore_errors),
            ),
            AlgorithmConfig::Smc(algorithm) => Controllers::Smc(SmcController::new(
                algorithm.clone(),
                batch,
                config.ignore_errors,
                config.seed,
            )),
        }
    }

    pub fn step(&mut self, master: &mut Masters) -> Result<Status, EngineError> {
        let outcome = match self {
            Controllers::Sweep(controller) => controller.step(master),
            Controllers::Rejection(controller) => controller.step(master),
            Controllers::Smc(controller) => controller.step(master),
        };

        if outcome.is_err() {
            self.mark_aborted();
        }

        outcome
    }

    pub fn state(&self) -> RunState {
        match self {
            Controllers::Sweep(controller) => controller.state,
            Controllers::Rejection(controller) => controller.state,
            Controllers::Smc(controller) => controller.state,
        }
    }

    fn mark_aborted(&mut self) {
        match self {
            Controllers::Sweep(controller) => controller.state = RunState::Aborted,
            Controllers::Rejection(controller) => controller.state = RunState::Aborted,
            Controllers::Smc(controller) => controller.state = RunState::Aborted,
        }
    }

    /// Write the run's accepted parameters in the names-header-plus-rows
    /// format.
    pub fn write_results<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Controllers::Sweep(controller) => controller.write_results(writer),
            Controllers::Rejection(controller) => controller.write_results(writer),
            Controllers::Smc(controller) => controller.write_results(writer),
        }
    }

    /// Log what the run had committed before it was cut short, so an
    /// interrupted run leaves its state inspectable.
    pub fn report_interrupted(&self) {
        match self {
            Controllers::Sweep(controller) => {
                info!(
                    finished = controller.outputs().len(),
                    "sweep interrupted; finished task outputs retained"
                );
            }
            Controllers::Rejection(controller) => {
                info!(
                    accepted = controller.accepted().len(),
                    simulated = controller.num_simulated(),
                    "rejection sampling interrupted; accepted parameters retained"
                );
            }
            Controllers::Smc(controller) => {
                info!(
                    completed_generations = controller.completed_generations(),
                    "smc interrupted; last committed population retained"
                );
            }
        }
    }
}

/// Drive a controller to its stopping condition.
pub fn run(controller: &mut Controllers, master: &mut Masters) -> Result<(), EngineError> {
    loop {
        match controller.step(master)? {
            Status::Done => return Ok(()),
            Status::Continue => {}
        }
    }
}

/// Check one task result against the error policy.
///
/// `Ok(true)` means the result is usable; `Ok(false)` means the task failed
/// but the run tolerates it; an error converts the failure into a
/// run-aborting one.
pub(crate) fn screen_result(
    result: &TaskResult,
    command: &Command,
    ignore_errors: bool,
) -> Result<bool, EngineError> {
    if result.is_ok() {
        return Ok(true);
    }

    if ignore_errors {
        warn!(command = %command, status = %result.status, "task failed, continuing");
        return Ok(false);
    }

    Err(EngineError::ChildExit {
        command: command.to_string(),
        status: result.status.to_string(),
        stderr: result.stderr.clone(),
    })
}

/// Apply the error policy to a parse attempt on task output.
pub(crate) fn screen_parse<T>(
    parsed: Result<T, EngineError>,
    ignore_errors: bool,
) -> Result<Option<T>, EngineError> {
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(e) if ignore_errors => {
            warn!(error = %e, "discarding unparseable task output");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Monotonic task-id allocator; ids tie results back to their tasks across
/// any-order completion.
#[derive(Debug, Default)]
pub(crate) struct TaskIds(u64);

impl TaskIds {
    pub fn next(&mut self, command: &Command, input: String) -> Task {
        self.0 += 1;

        Task::new(self.0, command.clone(), input)
    }
}
