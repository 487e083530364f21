use super::{screen_parse, screen_result, RunState, Status, TaskIds};
use crate::{
    config::SmcConfig,
    error::EngineError,
    master::Masters,
    population::{sample_index, smc_weight, Population},
    protocol::{
        format_parameter_record, format_perturbation_pdf_input, format_perturber_input,
        format_simulator_input, parse_parameter_output, parse_scalar, parse_scalars,
        write_parameters,
    },
};
use rand::{rngs::StdRng, SeedableRng};
use std::{io, mem};
use tracing::{debug, info};

/// Sequential population refinement over a shrinking epsilon schedule.
///
/// Generation 0 draws candidates straight from the prior sampler; every
/// later generation resamples the previous population by weight, perturbs
/// the draw and keeps proposing until the prior density is nonzero.
/// Accepted particles are reweighted against the previous generation and
/// the weights self-normalize when the generation's population is full.
pub struct SmcController {
    config: SmcConfig,
    batch: usize,
    ignore_errors: bool,
    generation: usize,
    population: Option<Population>,
    fresh_particles: Vec<Vec<f64>>,
    fresh_weights: Vec<f64>,
    num_simulated: u64,
    epsilon_trace: Vec<f64>,
    rng: StdRng,
    pub(super) state: RunState,
    ids: TaskIds,
}

impl SmcController {
    pub fn new(config: SmcConfig, batch: usize, ignore_errors: bool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            batch: batch.max(1),
            ignore_errors,
            generation: 0,
            population: None,
            fresh_particles: Vec::new(),
            fresh_weights: Vec::new(),
            num_simulated: 0,
            epsilon_trace: Vec::new(),
            rng,
            state: RunState::Configuring,
            ids: TaskIds::default(),
        }
    }

    pub fn step(&mut self, master: &mut Masters) -> Result<Status, EngineError> {
        if self.state == RunState::Configuring {
            info!(
                generation = 0usize,
                epsilon = self.config.epsilons[0],
                "computing generation"
            );
            self.state = RunState::Running;
        }

        let epsilon = self.config.epsilons[self.generation];
        let want = self
            .batch
            .min(self.config.population_size - self.fresh_particles.len());

        let candidates = self.propose(master, want)?;
        if candidates.is_empty() {
            return Ok(Status::Continue);
        }

        let simulator_tasks = candidates
            .iter()
            .map(|(parameter, _)| {
                self.ids.next(
                    &self.config.simulator,
                    format_simulator_input(epsilon, parameter),
                )
            })
            .collect();
        let results = master.dispatch(simulator_tasks)?;

        let mut accepted = Vec::new();
        for ((parameter, prior_density), result) in candidates.into_iter().zip(results) {
            self.num_simulated += 1;

            if !screen_result(&result, &self.config.simulator, self.ignore_errors)? {
                continue;
            }

            let parsed = parse_scalar(&result.stdout, &self.config.simulator);
            let Some(distance) = screen_parse(parsed, self.ignore_errors)? else {
                continue;
            };

            if distance <= epsilon {
                accepted.push((parameter, prior_density));
            }
        }

        self.weigh_accepted(master, accepted)?;

        debug!(
            generation = self.generation,
            accepted = self.fresh_particles.len(),
            simulated = self.num_simulated,
            "generation progress"
        );

        if self.fresh_particles.len() >= self.config.population_size {
            return self.commit_generation(epsilon);
        }

        Ok(Status::Continue)
    }

    /// Propose `want` candidates paired with their prior density.
    fn propose(
        &mut self,
        master: &mut Masters,
        want: usize,
    ) -> Result<Vec<(Vec<f64>, f64)>, EngineError> {
        let arity = self.config.parameter_names.len();

        if self.generation == 0 {
            let tasks = (0..want)
                .map(|_| self.ids.next(&self.config.prior_sampler, String::new()))
                .collect();
            let mut candidates = Vec::with_capacity(want);

            for result in master.dispatch(tasks)? {
                if !screen_result(&result, &self.config.prior_sampler, self.ignore_errors)? {
                    continue;
                }

                let parsed =
                    parse_parameter_output(&result.stdout, arity, &self.config.prior_sampler);
                if let Some(parameter) = screen_parse(parsed, self.ignore_errors)? {
                    // the prior density cancels against itself in generation
                    // 0 weights; any positive placeholder does
                    candidates.push((parameter, 1.0));
                }
            }

            return Ok(candidates);
        }

        let cumulative = self
            .population
            .as_ref()
            .map(Population::cumulative_weights)
            .unwrap_or_default();
        let mut candidates = Vec::with_capacity(want);

        // Resample and perturb until every slot holds a particle inside the
        // prior's support.  Termination surfaces through dispatch.
        while candidates.len() < want {
            let missing = want - candidates.len();
            let sources: Vec<Vec<f64>> = {
                let previous = self.population.as_ref().expect("generation > 0");

                (0..missing)
                    .map(|_| previous.particles[sample_index(&cumulative, &mut self.rng)].clone())
                    .collect()
            };

            let perturber_tasks = sources
                .iter()
                .map(|source| {
                    self.ids.next(
                        &self.config.perturber,
                        format_perturber_input(self.generation, source),
                    )
                })
                .collect();
            let mut perturbed = Vec::with_capacity(missing);

            for result in master.dispatch(perturber_tasks)? {
                if !screen_result(&result, &self.config.perturber, self.ignore_errors)? {
                    continue;
                }

                let parsed = parse_parameter_output(&result.stdout, arity, &self.config.perturber);
                if let Some(parameter) = screen_parse(parsed, self.ignore_errors)? {
                    perturbed.push(parameter);
                }
            }

            if perturbed.is_empty() {
                continue;
            }

            let density_tasks = perturbed
                .iter()
                .map(|parameter| {
                    self.ids
                        .next(&self.config.prior_pdf, format_parameter_record(parameter))
                })
                .collect();
            let results = master.dispatch(density_tasks)?;

            for (parameter, result) in perturbed.into_iter().zip(results) {
                if !screen_result(&result, &self.config.prior_pdf, self.ignore_errors)? {
                    continue;
                }

                let parsed = parse_scalar(&result.stdout, &self.config.prior_pdf);
                let Some(density) = screen_parse(parsed, self.ignore_errors)? else {
                    continue;
                };

                if density > 0.0 && candidates.len() < want {
                    candidates.push((parameter, density));
                }
            }
        }

        Ok(candidates)
    }

    /// Compute importance weights for this round's accepted particles and
    /// fold them into the growing generation.
    fn weigh_accepted(
        &mut self,
        master: &mut Masters,
        accepted: Vec<(Vec<f64>, f64)>,
    ) -> Result<(), EngineError> {
        if accepted.is_empty() {
            return Ok(());
        }

        if self.generation == 0 {
            for (parameter, _) in accepted {
                self.fresh_particles.push(parameter);
                self.fresh_weights.push(1.0);
            }

            return Ok(());
        }

        let density_tasks = accepted
            .iter()
            .map(|(parameter, _)| {
                let previous = self.population.as_ref().expect("generation > 0");

                self.ids.next(
                    &self.config.perturbation_pdf,
                    format_perturbation_pdf_input(self.generation, parameter, &previous.particles),
                )
            })
            .collect();
        let results = master.dispatch(density_tasks)?;

        let previous = self.population.as_ref().expect("generation > 0");
        for ((parameter, prior_density), result) in accepted.into_iter().zip(results) {
            if !screen_result(&result, &self.config.perturbation_pdf, self.ignore_errors)? {
                continue;
            }

            let parsed = parse_scalars(&result.stdout, previous.len(), &self.config.perturbation_pdf);
            let Some(densities) = screen_parse(parsed, self.ignore_errors)? else {
                continue;
            };

            self.fresh_particles.push(parameter);
            self.fresh_weights
                .push(smc_weight(prior_density, &previous.weights, &densities));
        }

        Ok(())
    }

    fn commit_generation(&mut self, epsilon: f64) -> Result<Status, EngineError> {
        self.fresh_particles.truncate(self.config.population_size);
        self.fresh_weights.truncate(self.config.population_size);

        info!(
            generation = self.generation,
            accepted = self.config.population_size,
            simulated = self.num_simulated,
            accepted_pct = 100.0 * self.config.population_size as f64 / self.num_simulated as f64,
            "generation finished"
        );

        self.population = Some(Population::new(
            mem::take(&mut self.fresh_particles),
            mem::take(&mut self.fresh_weights),
            epsilon,
        ));
        self.epsilon_trace.push(epsilon);
        self.generation += 1;
        self.num_simulated = 0;

        if self.generation == self.config.epsilons.len() {
            self.state = RunState::Completed;
            info!("smc finished");

            return Ok(Status::Done);
        }

        info!(
            generation = self.generation,
            epsilon = self.config.epsilons[self.generation],
            "computing generation"
        );

        Ok(Status::Continue)
    }

    /// The last committed population; interrupted generations are abandoned
    /// and never show up here.
    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn completed_generations(&self) -> usize {
        self.generation
    }

    /// Epsilon values consumed so far, one per committed generation.
    pub fn epsilon_trace(&self) -> &[f64] {
        &self.epsilon_trace
    }

    pub fn write_results<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        let rows = self
            .population
            .as_ref()
            .map(|population| population.particles.as_slice())
            .unwrap_or(&[]);

        write_parameters(writer, &self.config.parameter_names, rows)
    }
}
