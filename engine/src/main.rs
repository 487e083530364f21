use abacus_engine::{
    config::EngineConfig,
    controller::{self, Controllers},
    error::EngineError,
    master::Masters,
};
use clap::Parser;
use std::{backtrace::Backtrace, io::Write, path::PathBuf, time::Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Approximate Bayesian computation over black-box commands.
#[derive(Parser, Debug)]
#[command(name = "abacus", version, about)]
struct Cli {
    /// Path to the YAML run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured resampling seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Panics are reported through the log with whatever backtrace the
    // runtime can produce, then the run exits non-zero like any other
    // fatal error.
    std::panic::set_hook(Box::new(|panic| {
        error!("{panic}");
        error!("backtrace:\n{}", Backtrace::force_capture());
    }));

    std::process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
    let mut config = match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "could not load configuration");
            return 1;
        }
    };

    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let ctx = config.context();
    if let Err(e) = ctx.register_signals() {
        error!(error = %e, "could not register signal handlers");
        return 1;
    }

    let mut master = match Masters::load(&config, &ctx) {
        Ok(master) => master,
        Err(e) => {
            error!(error = %e, "could not start master");
            return 1;
        }
    };
    let mut controller = Controllers::from_config(&config);

    let start = Instant::now();
    let outcome = controller::run(&mut controller, &mut master);

    // Workers are torn down regardless of how the run ended; a failed
    // shutdown is reported but does not mask the run's own outcome.
    if let Err(e) = master.shutdown_all() {
        error!(error = %e, "worker shutdown failed");
    }

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run finished"
    );

    match outcome {
        Ok(()) => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();

            if let Err(e) = controller
                .write_results(&mut lock)
                .and_then(|()| lock.flush())
            {
                error!(error = %e, "could not write results");
                return 1;
            }

            0
        }
        Err(EngineError::Terminated) => {
            warn!("run interrupted by termination signal");
            controller.report_interrupted();

            // distinct from a fatal error: 128 + SIGINT
            130
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            1
        }
    }
}
