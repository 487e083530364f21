use std::{
    io::Write,
    process::{Command, Stdio},
};

fn run(bin: &str, args: &[&str], input: &str) -> (String, String, i32) {
    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn demo program");

    child
        .stdin
        .take()
        .expect("stdin pipe")
        .write_all(input.as_bytes())
        .expect("write stdin");

    let output = child.wait_with_output().expect("wait for demo program");

    (
        String::from_utf8(output.stdout).expect("utf-8 stdout"),
        String::from_utf8(output.stderr).expect("utf-8 stderr"),
        output.status.code().unwrap_or(-1),
    )
}

fn parse_lines(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .map(|line| line.trim().parse().expect("numeric output"))
        .collect()
}

#[test]
fn uniform_pdf_answers_one_density_per_record() {
    let (stdout, _, code) = run(
        env!("CARGO_BIN_EXE_uniform-pdf"),
        &["0", "2"],
        "0.5\n1\n3\n",
    );

    assert_eq!(code, 0);
    assert_eq!(parse_lines(&stdout), vec![0.5, 0.5, 0.0]);
}

#[test]
fn uniform_pdf_exits_cleanly_on_closed_input() {
    let (stdout, _, code) = run(env!("CARGO_BIN_EXE_uniform-pdf"), &["0", "1"], "");

    assert_eq!(code, 0);
    assert!(stdout.is_empty());
}

#[test]
fn uniform_pdf_rejects_inverted_bounds() {
    let (_, stderr, code) = run(env!("CARGO_BIN_EXE_uniform-pdf"), &["2", "1"], "");

    assert_ne!(code, 0);
    assert!(!stderr.is_empty());
}

#[test]
fn uniform_pdf_prints_usage_without_arguments() {
    let (_, stderr, code) = run(env!("CARGO_BIN_EXE_uniform-pdf"), &[], "");

    assert_eq!(code, 2);
    assert!(stderr.contains("Usage"));
}

#[test]
fn uniform_pdf_fails_on_malformed_input() {
    let (_, _, code) = run(env!("CARGO_BIN_EXE_uniform-pdf"), &["0", "1"], "abc\n");

    assert_ne!(code, 0);
}

#[test]
fn uniform_sampler_respects_bounds_and_seed() {
    let bin = env!("CARGO_BIN_EXE_uniform-sampler");
    let (first, _, code) = run(bin, &["0.25", "0.75", "42"], "");
    let (second, _, _) = run(bin, &["0.25", "0.75", "42"], "");

    assert_eq!(code, 0);
    assert_eq!(first, second);

    let sample: f64 = first.trim().parse().unwrap();
    assert!((0.25..0.75).contains(&sample));
}

#[test]
fn perturber_moves_the_given_parameter() {
    let (stdout, _, code) = run(
        env!("CARGO_BIN_EXE_normal-perturber"),
        &["0.1", "7"],
        "1 0.5\n2 0.5\n",
    );

    assert_eq!(code, 0);
    let values = parse_lines(&stdout);
    assert_eq!(values.len(), 2);
    for value in values {
        assert!((value - 0.5).abs() < 1.0);
    }
}

#[test]
fn perturbation_pdf_answers_one_density_per_population_member() {
    let (stdout, _, code) = run(
        env!("CARGO_BIN_EXE_normal-perturbation-pdf"),
        &["0.5"],
        "1 0\n0\n10\n",
    );

    assert_eq!(code, 0);
    let values = parse_lines(&stdout);
    assert_eq!(values.len(), 2);
    assert!((values[0] - 0.7978845608028654).abs() < 1e-12);
    assert!(values[1] < 1e-12);
}

#[test]
fn coin_simulator_reports_the_head_count_distance() {
    let bin = env!("CARGO_BIN_EXE_coin-simulator");

    // q = 1 always lands 20 heads, q = 0 none
    let (stdout, _, code) = run(bin, &["10", "3"], "0 1\n0 0\n");

    assert_eq!(code, 0);
    assert_eq!(parse_lines(&stdout), vec![10.0, 10.0]);
}

#[test]
fn coin_simulator_rejects_bad_arguments() {
    let (_, _, code) = run(env!("CARGO_BIN_EXE_coin-simulator"), &["25"], "");
    assert_eq!(code, 2);

    let (_, _, code) = run(env!("CARGO_BIN_EXE_coin-simulator"), &["10"], "0 2\n");
    assert_ne!(code, 0);
}
