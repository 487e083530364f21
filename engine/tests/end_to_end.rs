use abacus_engine::{
    config::EngineConfig,
    controller::{self, Controllers, RejectionController, RunState, SmcController},
    error::EngineError,
    master::Masters,
};
use std::{fs, path::PathBuf};

fn unique_temp(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("abacus-{name}-{}", std::process::id()));
    let _ = fs::remove_file(&path);

    path
}

fn run_config(yaml: &str) -> (Controllers, Result<(), EngineError>) {
    let config: EngineConfig = serde_yaml::from_str(yaml).expect("parse test config");
    let ctx = config.context();
    let mut master = Masters::load(&config, &ctx).expect("start master");
    let mut controller = Controllers::from_config(&config);

    let outcome = controller::run(&mut controller, &mut master);
    master.shutdown_all().expect("shut down workers");

    (controller, outcome)
}

fn rejection(controller: &Controllers) -> &RejectionController {
    match controller {
        Controllers::Rejection(inner) => inner,
        _ => panic!("expected a rejection controller"),
    }
}

fn smc(controller: &Controllers) -> &SmcController {
    match controller {
        Controllers::Smc(inner) => inner,
        _ => panic!("expected an smc controller"),
    }
}

#[test]
fn rejection_with_zero_distance_accepts_everything_in_one_round() {
    let log = unique_temp("rejection-log");
    let yaml = format!(
        "
algorithm:
  rejection:
    simulator: sh -c 'echo run >> {log}; echo 0'
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 3
pool:
  size: 4
",
        log = log.display()
    );

    let (controller, outcome) = run_config(&yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);

    let inner = rejection(&controller);
    assert_eq!(inner.accepted().len(), 3);
    assert_eq!(inner.num_simulated(), 3);
    assert!((inner.acceptance_rate() - 1.0).abs() < 1e-12);
    assert!(inner.accepted().iter().all(|p| p == &vec![0.5]));

    // exactly one simulator invocation per accepted sample
    let runs = fs::read_to_string(&log).unwrap();
    assert_eq!(runs.lines().count(), 3);
    let _ = fs::remove_file(&log);

    let mut output = Vec::new();
    controller.write_results(&mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "q\n0.5\n0.5\n0.5\n");
}

#[test]
fn rejection_completes_over_the_cluster_master() {
    let yaml = "
algorithm:
  rejection:
    simulator: echo 0
    prior_sampler: echo 0.25
    parameter_names: [q]
    epsilon: 0.5
    num_accept: 7
pool:
  size: 3
  worker: cluster
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);
    assert_eq!(rejection(&controller).accepted().len(), 7);
}

#[test]
fn rejection_completes_with_persistent_workers() {
    // the simulator stays alive across tasks, answering one line per record
    let yaml = "
algorithm:
  rejection:
    simulator: awk '{print 0; fflush()}'
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 5
pool:
  size: 2
  worker: persistent-forked
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);
    assert_eq!(rejection(&controller).accepted().len(), 5);
}

#[test]
fn rejection_completes_with_persistent_cluster_workers() {
    let yaml = "
algorithm:
  rejection:
    simulator: awk '{print 0; fflush()}'
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 4
pool:
  size: 2
  worker: persistent-cluster
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);
    assert_eq!(rejection(&controller).accepted().len(), 4);
}

#[test]
fn smc_consumes_the_schedule_and_normalizes_weights() {
    let yaml = "
algorithm:
  smc:
    simulator: echo 0
    prior_sampler: echo 0.5
    prior_pdf: echo 1
    perturber: awk '{print $2}'
    perturbation_pdf: awk 'NR>1 {print 1}'
    parameter_names: [q]
    epsilons: [1.0, 0.5]
    population_size: 4
pool:
  size: 2
seed: 42
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);

    let inner = smc(&controller);
    assert_eq!(inner.completed_generations(), 2);
    assert_eq!(inner.epsilon_trace(), [1.0, 0.5]);

    let population = inner.population().unwrap();
    assert_eq!(population.len(), 4);
    assert_eq!(population.epsilon, 0.5);
    assert!((population.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(population.particles.iter().all(|p| p == &vec![0.5]));
}

#[test]
fn sweep_runs_the_generated_list_once() {
    let yaml = "
algorithm:
  sweep:
    simulator: cat
    generator: printf '0.1\\n0.2\\n0.3\\n'
    parameter_names: [q]
pool:
  size: 2
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);

    let inner = match &controller {
        Controllers::Sweep(inner) => inner,
        _ => panic!("expected a sweep controller"),
    };
    assert_eq!(inner.parameters(), [vec![0.1], vec![0.2], vec![0.3]]);
    assert_eq!(
        inner
            .outputs()
            .iter()
            .map(|s| s.trim())
            .collect::<Vec<_>>(),
        ["0.1", "0.2", "0.3"]
    );
}

#[test]
fn sweep_works_over_persistent_workers() {
    let yaml = "
algorithm:
  sweep:
    simulator: cat
    generator: printf '1\\n2\\n3\\n4\\n'
    parameter_names: [q]
pool:
  size: 2
  worker: persistent-forked
";

    let (controller, outcome) = run_config(yaml);
    outcome.unwrap();
    assert_eq!(controller.state(), RunState::Completed);
}

#[test]
fn termination_prevents_any_process_from_spawning() {
    let marker = unique_temp("termination-marker");
    let yaml = format!(
        "
algorithm:
  rejection:
    simulator: sh -c 'touch {marker}; echo 0'
    prior_sampler: sh -c 'touch {marker}; echo 0.5'
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 2
pool:
  size: 2
",
        marker = marker.display()
    );

    let config: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
    let ctx = config.context();
    ctx.request_termination();

    let mut master = Masters::load(&config, &ctx).unwrap();
    let mut controller = Controllers::from_config(&config);

    let outcome = controller::run(&mut controller, &mut master);
    master.shutdown_all().unwrap();

    assert!(matches!(outcome, Err(EngineError::Terminated)));
    assert_eq!(controller.state(), RunState::Aborted);
    assert!(!marker.exists());
}

#[test]
fn failed_tasks_abort_the_run_by_default() {
    let yaml = "
algorithm:
  rejection:
    simulator: sh -c 'echo boom >&2; exit 3'
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 2
pool:
  size: 2
";

    let (controller, outcome) = run_config(yaml);

    match outcome {
        Err(EngineError::ChildExit { status, stderr, .. }) => {
            assert!(status.contains('3'));
            assert!(stderr.contains("boom"));
        }
        other => panic!("expected a child exit error, got {other:?}"),
    }
    assert_eq!(controller.state(), RunState::Aborted);
}

#[test]
fn tolerant_runs_survive_flaky_tasks() {
    let flag = unique_temp("flaky-flag");
    let yaml = format!(
        "
algorithm:
  rejection:
    simulator: sh -c 'if [ -f {flag} ]; then echo 0; else touch {flag}; exit 3; fi'
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 2
pool:
  size: 2
ignore_errors: true
",
        flag = flag.display()
    );

    let (controller, outcome) = run_config(&yaml);
    outcome.unwrap();

    assert_eq!(controller.state(), RunState::Completed);

    let inner = rejection(&controller);
    assert_eq!(inner.accepted().len(), 2);
    assert!(inner.num_simulated() > 2);
    assert!(inner.acceptance_rate() < 1.0);

    let _ = fs::remove_file(&flag);
}

#[test]
fn launch_failures_are_fatal_even_when_tolerant() {
    let yaml = "
algorithm:
  rejection:
    simulator: ./definitely-not-here
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 1
pool:
  size: 1
ignore_errors: true
";

    let (controller, outcome) = run_config(yaml);

    assert!(matches!(outcome, Err(EngineError::Launch { .. })));
    assert_eq!(controller.state(), RunState::Aborted);
}

#[test]
fn cli_runs_a_config_file_end_to_end() {
    let config_path = unique_temp("cli-config.yaml");
    fs::write(
        &config_path,
        "
algorithm:
  rejection:
    simulator: echo 0
    prior_sampler: echo 0.5
    parameter_names: [q]
    epsilon: 0.0
    num_accept: 2
pool:
  size: 2
",
    )
    .unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_abacus"))
        .args(["--config"])
        .arg(&config_path)
        .output()
        .expect("run the engine binary");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "q\n0.5\n0.5\n"
    );

    let _ = fs::remove_file(&config_path);
}
