use super::{screen_parse, screen_result, RunState, Status, TaskIds};
use crate::{
    config::RejectionConfig,
    error::EngineError,
    master::Masters,
    protocol::{
        format_simulator_input, parse_parameter_output, parse_scalar, write_parameters,
    },
};
use std::io;
use tracing::{debug, info};

/// Sample-simulate-accept loop: draw candidates from the prior sampler, run
/// them through the simulator and keep those whose distance is within
/// epsilon, until the requested number of accepted samples is reached.
pub struct RejectionController {
    config: RejectionConfig,
    batch: usize,
    ignore_errors: bool,
    accepted: Vec<Vec<f64>>,
    num_simulated: u64,
    pub(super) state: RunState,
    ids: TaskIds,
}

impl RejectionController {
    pub fn new(config: RejectionConfig, batch: usize, ignore_errors: bool) -> Self {
        Self {
            config,
            batch: batch.max(1),
            ignore_errors,
            accepted: Vec::new(),
            num_simulated: 0,
            state: RunState::Configuring,
            ids: TaskIds::default(),
        }
    }

    /// One step dispatches a prior-sampler batch and a simulator batch of
    /// size min(pool capacity, still-needed samples), so sampling and
    /// simulation latencies overlap across the pool.
    pub fn step(&mut self, master: &mut Masters) -> Result<Status, EngineError> {
        if self.state == RunState::Configuring {
            info!(
                num_accept = self.config.num_accept,
                epsilon = self.config.epsilon,
                "rejection sampling"
            );
            self.state = RunState::Running;
        }

        let arity = self.config.parameter_names.len();
        let want = self
            .batch
            .min(self.config.num_accept - self.accepted.len());

        let sampler_tasks = (0..want)
            .map(|_| self.ids.next(&self.config.prior_sampler, String::new()))
            .collect();
        let mut candidates = Vec::with_capacity(want);

        for result in master.dispatch(sampler_tasks)? {
            if !screen_result(&result, &self.config.prior_sampler, self.ignore_errors)? {
                continue;
            }

            let parsed = parse_parameter_output(&result.stdout, arity, &self.config.prior_sampler);
            if let Some(parameter) = screen_parse(parsed, self.ignore_errors)? {
                candidates.push(parameter);
            }
        }

        if candidates.is_empty() {
            return Ok(Status::Continue);
        }

        let simulator_tasks = candidates
            .iter()
            .map(|parameter| {
                self.ids.next(
                    &self.config.simulator,
                    format_simulator_input(self.config.epsilon, parameter),
                )
            })
            .collect();
        let results = master.dispatch(simulator_tasks)?;

        for (parameter, result) in candidates.into_iter().zip(results) {
            self.num_simulated += 1;

            if !screen_result(&result, &self.config.simulator, self.ignore_errors)? {
                continue;
            }

            let parsed = parse_scalar(&result.stdout, &self.config.simulator);
            let Some(distance) = screen_parse(parsed, self.ignore_errors)? else {
                continue;
            };

            if distance <= self.config.epsilon {
                self.accepted.push(parameter);
            }
        }

        debug!(
            accepted = self.accepted.len(),
            simulated = self.num_simulated,
            "rejection progress"
        );

        if self.accepted.len() >= self.config.num_accept {
            self.accepted.truncate(self.config.num_accept);
            info!(
                accepted = self.accepted.len(),
                simulated = self.num_simulated,
                acceptance_rate = self.acceptance_rate(),
                "rejection sampling finished"
            );
            self.state = RunState::Completed;

            return Ok(Status::Done);
        }

        Ok(Status::Continue)
    }

    pub fn accepted(&self) -> &[Vec<f64>] {
        &self.accepted
    }

    pub fn num_simulated(&self) -> u64 {
        self.num_simulated
    }

    /// Empirical acceptance rate over every simulator invocation so far.
    pub fn acceptance_rate(&self) -> f64 {
        if self.num_simulated == 0 {
            return 0.0;
        }

        self.accepted.len() as f64 / self.num_simulated as f64
    }

    pub fn write_results<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        write_parameters(writer, &self.config.parameter_names, &self.accepted)
    }
}
