use abacus_demos::{format_full, normal_pdf};
use std::{
    io::{self, BufRead, Write},
    process::exit,
};

fn main() {
    exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} STDEV", args[0]);
        eprintln!("Read a 't q_new' record followed by one q_old per line and");
        eprintln!("print the normal transition density q_old -> q_new for each");
        return 2;
    }

    let sd: f64 = match args[1].parse() {
        Ok(sd) if sd > 0.0 => sd,
        _ => {
            eprintln!("Error: STDEV must be a positive number");
            return 2;
        }
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let header = match lines.next() {
        Some(Ok(header)) => header,
        _ => {
            eprintln!("Error: could not read t and q_new from stdin");
            return 1;
        }
    };

    let mut tokens = header.split_whitespace();
    let record = (
        tokens.next().and_then(|t| t.parse::<i64>().ok()),
        tokens.next().and_then(|q| q.parse::<f64>().ok()),
    );
    let q_new = match record {
        (Some(_t), Some(q_new)) => q_new,
        _ => {
            eprintln!("Error: could not read t and q_new from '{header}'");
            return 1;
        }
    };

    let mut stdout = io::stdout();

    for line in lines {
        let line = match line {
            Ok(line) => line,
            Err(_) => return 1,
        };

        if line.trim().is_empty() {
            continue;
        }

        let q_old: f64 = match line.split_whitespace().next().and_then(|t| t.parse().ok()) {
            Some(q_old) => q_old,
            None => {
                eprintln!("Error: could not read a population member from '{line}'");
                return 1;
            }
        };

        if writeln!(stdout, "{}", format_full(normal_pdf(q_old, sd, q_new))).is_err() {
            return 1;
        }
    }

    if stdout.flush().is_err() {
        return 1;
    }

    0
}
