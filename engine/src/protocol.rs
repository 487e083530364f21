//! Line protocol spoken with the external commands.
//!
//! Every record is a single line of whitespace-separated tokens.  The
//! simulator receives the acceptance threshold followed by the candidate
//! parameter and answers with one distance value; density commands answer
//! one density per parameter record they are fed.  Values are formatted
//! with round-trip precision.

use crate::{command::Command, error::EngineError};
use itertools::Itertools;
use std::io::{self, Write};

pub fn format_value(value: f64) -> String {
    format!("{value}")
}

pub fn format_parameter(parameter: &[f64]) -> String {
    parameter.iter().map(|v| format_value(*v)).join(" ")
}

/// Simulator record: `epsilon p1 .. pk`.
pub fn format_simulator_input(epsilon: f64, parameter: &[f64]) -> String {
    format!(
        "{} {}\n",
        format_value(epsilon),
        format_parameter(parameter)
    )
}

/// Perturber record: `t p1 .. pk`.
pub fn format_perturber_input(generation: usize, parameter: &[f64]) -> String {
    format!("{generation} {}\n", format_parameter(parameter))
}

pub fn format_parameter_record(parameter: &[f64]) -> String {
    format!("{}\n", format_parameter(parameter))
}

/// Perturbation-density record: the perturber record for the new particle,
/// followed by one line per member of the previous population.
pub fn format_perturbation_pdf_input(
    generation: usize,
    perturbed: &[f64],
    population: &[Vec<f64>],
) -> String {
    let mut input = format_perturber_input(generation, perturbed);

    for parameter in population {
        input.push_str(&format_parameter_record(parameter));
    }

    input
}

/// Parse one parameter record of known arity.
pub fn parse_parameter(
    line: &str,
    arity: usize,
    command: &Command,
) -> Result<Vec<f64>, EngineError> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| parse_error(command, format!("'{}': {e}", line.trim_end())))?;

    if values.len() != arity {
        return Err(parse_error(
            command,
            format!("expected {arity} values, got {}", values.len()),
        ));
    }

    Ok(values)
}

/// Parse the first line of a command's output as a parameter record.
pub fn parse_parameter_output(
    output: &str,
    arity: usize,
    command: &Command,
) -> Result<Vec<f64>, EngineError> {
    let line = output
        .lines()
        .next()
        .ok_or_else(|| parse_error(command, "empty output".to_string()))?;

    parse_parameter(line, arity, command)
}

/// Parse a generator's output: one parameter record per non-empty line.
pub fn parse_parameter_lines(
    output: &str,
    arity: usize,
    command: &Command,
) -> Result<Vec<Vec<f64>>, EngineError> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_parameter(line, arity, command))
        .collect()
}

/// Parse the first line of a command's output as one numeric value.
pub fn parse_scalar(output: &str, command: &Command) -> Result<f64, EngineError> {
    let line = output
        .lines()
        .next()
        .ok_or_else(|| parse_error(command, "empty output".to_string()))?;

    line.trim()
        .parse()
        .map_err(|e| parse_error(command, format!("'{}': {e}", line.trim_end())))
}

/// Parse exactly `count` numeric values, one per line.
pub fn parse_scalars(
    output: &str,
    count: usize,
    command: &Command,
) -> Result<Vec<f64>, EngineError> {
    let values: Vec<f64> = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.trim()
                .parse()
                .map_err(|e| parse_error(command, format!("'{}': {e}", line.trim_end())))
        })
        .collect::<Result<_, _>>()?;

    if values.len() != count {
        return Err(parse_error(
            command,
            format!("expected {count} values, got {}", values.len()),
        ));
    }

    Ok(values)
}

/// Write accepted parameters as a names header plus one record per row.
pub fn write_parameters<W: Write>(
    writer: &mut W,
    names: &[String],
    rows: &[Vec<f64>],
) -> io::Result<()> {
    writeln!(writer, "{}", names.join(" "))?;

    for row in rows {
        writeln!(writer, "{}", format_parameter(row))?;
    }

    Ok(())
}

fn parse_error(command: &Command, detail: String) -> EngineError {
    EngineError::Parse {
        command: command.to_string(),
        detail,
    }
}
