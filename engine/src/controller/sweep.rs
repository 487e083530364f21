use super::{screen_result, RunState, Status, TaskIds};
use crate::{
    config::SweepConfig,
    error::EngineError,
    master::Masters,
    protocol::{format_parameter_record, parse_parameter_lines, write_parameters},
};
use std::io;
use tracing::info;

/// Runs the simulator once over a fixed, pre-generated parameter list.
/// No acceptance logic; terminal after a single working step.
pub struct SweepController {
    config: SweepConfig,
    ignore_errors: bool,
    parameters: Vec<Vec<f64>>,
    outputs: Vec<String>,
    pub(super) state: RunState,
    ids: TaskIds,
}

impl SweepController {
    pub fn new(config: SweepConfig, ignore_errors: bool) -> Self {
        Self {
            config,
            ignore_errors,
            parameters: Vec::new(),
            outputs: Vec::new(),
            state: RunState::Configuring,
            ids: TaskIds::default(),
        }
    }

    pub fn step(&mut self, master: &mut Masters) -> Result<Status, EngineError> {
        self.state = RunState::Running;

        // Enumerate the task list.  A broken generator is never tolerable:
        // without it there is nothing to sweep.
        let generated = master
            .dispatch(vec![self.ids.next(&self.config.generator, String::new())])?
            .pop()
            .ok_or_else(|| EngineError::Transport("generator result missing".to_string()))?;
        screen_result(&generated, &self.config.generator, false)?;

        let arity = self.config.parameter_names.len();
        self.parameters = parse_parameter_lines(&generated.stdout, arity, &self.config.generator)?;

        if self.parameters.is_empty() {
            return Err(EngineError::Parse {
                command: self.config.generator.to_string(),
                detail: "generator did not output any parameters".to_string(),
            });
        }

        info!(tasks = self.parameters.len(), "sweeping parameter list");

        let tasks = self
            .parameters
            .iter()
            .map(|parameter| {
                self.ids
                    .next(&self.config.simulator, format_parameter_record(parameter))
            })
            .collect();
        let results = master.dispatch(tasks)?;

        for result in &results {
            screen_result(result, &self.config.simulator, self.ignore_errors)?;
        }

        self.outputs = results.into_iter().map(|result| result.stdout).collect();
        self.state = RunState::Completed;

        info!(finished = self.outputs.len(), "sweep finished");

        Ok(Status::Done)
    }

    pub fn parameters(&self) -> &[Vec<f64>] {
        &self.parameters
    }

    /// Raw simulator outputs, one per parameter, in list order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn write_results<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        write_parameters(writer, &self.config.parameter_names, &self.parameters)
    }
}
