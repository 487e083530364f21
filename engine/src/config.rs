use crate::{command::Command, context::RunContext, process::LaunchOptions};
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("failed to read configuration")]
    Unreadable(#[from] std::io::Error),
    #[error("failed to parse configuration")]
    Invalid(#[from] serde_yaml::Error),
    #[error("configuration failed preflight checks")]
    Preflight,
}

/// Top-level run configuration, loaded from YAML.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub algorithm: AlgorithmConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    /// Tolerate failed tasks (treat them as rejected) instead of aborting.
    #[serde(default)]
    pub ignore_errors: bool,

    /// Discard child stderr instead of capturing it into results.
    #[serde(default)]
    pub discard_child_stderr: bool,

    /// Seed for the engine-side resampling RNG.  Unseeded runs draw from
    /// entropy; external commands keep their own randomness either way.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of workers, i.e. maximum simultaneously running commands.
    #[serde(default = "default_pool_size")]
    pub size: usize,

    #[serde(default)]
    pub worker: WorkerVariant,

    /// Kill one-shot tasks that run longer than this many seconds.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    /// Grace period per escalation step when closing persistent services.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            worker: WorkerVariant::default(),
            task_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Worker lifecycle and placement selection.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerVariant {
    /// One process per task, in-process scheduling.
    #[default]
    Forked,
    /// One long-lived simulator process per worker, in-process scheduling.
    PersistentForked,
    /// One process per task on compute ranks behind the rank transport.
    #[serde(alias = "mpi")]
    Cluster,
    /// Long-lived simulator processes on compute ranks.
    #[serde(alias = "persistent-mpi")]
    PersistentCluster,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub enum AlgorithmConfig {
    Sweep(SweepConfig),
    Rejection(RejectionConfig),
    Smc(SmcConfig),
}

/// Enumerate a fixed parameter list and run the simulator over it once.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub simulator: Command,
    pub generator: Command,
    pub parameter_names: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RejectionConfig {
    pub simulator: Command,
    pub prior_sampler: Command,
    pub parameter_names: Vec<String>,
    pub epsilon: f64,
    pub num_accept: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SmcConfig {
    pub simulator: Command,
    pub prior_sampler: Command,
    pub prior_pdf: Command,
    pub perturber: Command,
    pub perturbation_pdf: Command,
    pub parameter_names: Vec<String>,
    pub epsilons: Vec<f64>,
    pub population_size: usize,
}

impl AlgorithmConfig {
    pub fn simulator(&self) -> &Command {
        match self {
            AlgorithmConfig::Sweep(config) => &config.simulator,
            AlgorithmConfig::Rejection(config) => &config.simulator,
            AlgorithmConfig::Smc(config) => &config.simulator,
        }
    }

    pub fn parameter_names(&self) -> &[String] {
        match self {
            AlgorithmConfig::Sweep(config) => &config.parameter_names,
            AlgorithmConfig::Rejection(config) => &config.parameter_names,
            AlgorithmConfig::Smc(config) => &config.parameter_names,
        }
    }

    fn commands(&self) -> Vec<(&'static str, &Command)> {
        match self {
            AlgorithmConfig::Sweep(config) => vec![
                ("simulator", &config.simulator),
                ("generator", &config.generator),
            ],
            AlgorithmConfig::Rejection(config) => vec![
                ("simulator", &config.simulator),
                ("prior_sampler", &config.prior_sampler),
            ],
            AlgorithmConfig::Smc(config) => vec![
                ("simulator", &config.simulator),
                ("prior_sampler", &config.prior_sampler),
                ("prior_pdf", &config.prior_pdf),
                ("perturber", &config.perturber),
                ("perturbation_pdf", &config.perturbation_pdf),
            ],
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_yaml::from_reader(file)?;

        if config.preflight_checks() {
            Err(ConfigErrors::Preflight)
        } else {
            Ok(config)
        }
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(self.ignore_errors, self.discard_child_stderr)
    }

    pub fn launch_options(&self, ctx: &RunContext) -> LaunchOptions {
        LaunchOptions {
            discard_stderr: ctx.discard_child_stderr,
            timeout: self.pool.task_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Validate the loaded configuration, reporting every problem found.
    /// Returns whether any error was encountered.
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make
        // debugging easier for users
        let mut contains_error = false;

        if self.pool.size == 0 {
            error!("pool.size cannot be 0, no task could ever be dispatched");
            contains_error = true;
        }

        for (label, command) in self.algorithm.commands() {
            if !command.is_executable() {
                error!(
                    "algorithm.{label} '{command}' is not an executable file and was not found in PATH"
                );
                contains_error = true;
            }
        }

        if self.algorithm.parameter_names().is_empty() {
            error!("parameter_names cannot be empty");
            contains_error = true;
        }

        match &self.algorithm {
            AlgorithmConfig::Sweep(_) => {}
            AlgorithmConfig::Rejection(config) => {
                if config.num_accept == 0 {
                    error!("rejection.num_accept cannot be 0");
                    contains_error = true;
                }

                if !config.epsilon.is_finite() {
                    error!("rejection.epsilon must be finite");
                    contains_error = true;
                }
            }
            AlgorithmConfig::Smc(config) => {
                if config.population_size == 0 {
                    error!("smc.population_size cannot be 0");
                    contains_error = true;
                }

                if config.epsilons.is_empty() {
                    error!("smc.epsilons cannot be empty");
                    contains_error = true;
                }

                if config.epsilons.windows(2).any(|pair| pair[0] < pair[1]) {
                    error!("smc.epsilons must be non-increasing");
                    contains_error = true;
                }

                if config.epsilons.iter().any(|epsilon| !epsilon.is_finite()) {
                    error!("smc.epsilons must all be finite");
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}

fn default_pool_size() -> usize {
    num_cpus::get()
}

fn default_shutdown_grace_secs() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection_yaml() -> &'static str {
        "
algorithm:
  rejection:
    simulator: echo 0
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 3
pool:
  size: 4
  worker: persistent-forked
"
    }

    #[test]
    fn parses_a_rejection_config() {
        let config: EngineConfig = serde_yaml::from_str(rejection_yaml()).unwrap();

        assert_eq!(config.pool.size, 4);
        assert_eq!(config.pool.worker, WorkerVariant::PersistentForked);
        assert!(!config.ignore_errors);
        assert!(!config.preflight_checks());

        match &config.algorithm {
            AlgorithmConfig::Rejection(rejection) => {
                assert_eq!(rejection.simulator.program(), "echo");
                assert_eq!(rejection.num_accept, 3);
            }
            other => panic!("unexpected algorithm: {other:?}"),
        }
    }

    #[test]
    fn accepts_mpi_variant_aliases() {
        let config: PoolConfig = serde_yaml::from_str("{size: 2, worker: mpi}").unwrap();
        assert_eq!(config.worker, WorkerVariant::Cluster);

        let config: PoolConfig =
            serde_yaml::from_str("{size: 2, worker: persistent-mpi}").unwrap();
        assert_eq!(config.worker, WorkerVariant::PersistentCluster);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<EngineConfig, _> =
            serde_yaml::from_str("{algorithm: {sweep: {simulator: echo, generator: echo, parameter_names: [a], surprise: 1}}}");
        assert!(result.is_err());
    }

    #[test]
    fn flags_an_increasing_epsilon_schedule() {
        let yaml = "
algorithm:
  smc:
    simulator: echo 0
    prior_sampler: echo 0.5
    prior_pdf: echo 1
    perturber: cat
    perturbation_pdf: cat
    parameter_names: [q]
    epsilons: [1.0, 2.0]
    population_size: 8
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.preflight_checks());
    }

    #[test]
    fn flags_missing_executables_and_zero_sizes() {
        let yaml = "
algorithm:
  rejection:
    simulator: ./no-such-simulator-anywhere
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.1
    num_accept: 0
pool:
  size: 0
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.preflight_checks());
    }
}
