use abacus_demos::{format_full, uniform_pdf};
use std::{
    io::{self, BufRead, Write},
    process::exit,
};

fn main() {
    exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: {} LOW HIGH", args[0]);
        eprintln!("Read one parameter per line from stdin and print the");
        eprintln!("uniform density on [LOW, HIGH] for each");
        return 2;
    }

    let (low, high) = match (args[1].parse::<f64>(), args[2].parse::<f64>()) {
        (Ok(low), Ok(high)) => (low, high),
        _ => {
            eprintln!("Error: LOW and HIGH must be numbers");
            return 2;
        }
    };

    if high <= low {
        eprintln!("Error: LOW must be strictly less than HIGH");
        return 2;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => return 1,
        };

        if line.trim().is_empty() {
            continue;
        }

        let x: f64 = match line.split_whitespace().next().and_then(|t| t.parse().ok()) {
            Some(x) => x,
            None => {
                eprintln!("Error: could not read a parameter from '{line}'");
                return 1;
            }
        };

        // one response per request, flushed so callers holding the pipe
        // open see it immediately
        if writeln!(stdout, "{}", format_full(uniform_pdf(low, high, x)))
            .and_then(|()| stdout.flush())
            .is_err()
        {
            return 1;
        }
    }

    0
}
