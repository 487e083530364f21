use abacus_demos::{format_full, rng_from};
use rand::Rng;
use rand_distr::StandardNormal;
use std::{
    io::{self, BufRead, Write},
    process::exit,
};

fn main() {
    exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} STDEV [SEED]", args[0]);
        eprintln!("Read 't q' records from stdin and perturb each q by a");
        eprintln!("normal draw with standard deviation STDEV");
        return 2;
    }

    let sd: f64 = match args[1].parse() {
        Ok(sd) if sd > 0.0 => sd,
        _ => {
            eprintln!("Error: STDEV must be a positive number");
            return 2;
        }
    };

    let seed = match args.get(2).map(|raw| raw.parse::<u64>()) {
        None => None,
        Some(Ok(seed)) => Some(seed),
        Some(Err(_)) => {
            eprintln!("Error: SEED must be a non-negative integer");
            return 2;
        }
    };

    let mut rng = rng_from(seed);
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

        let mut tokens = line.split_whitespace();
        let record = (
            tokens.next().and_then(|t| t.parse::<i64>().ok()),
            tokens.next().and_then(|q| q.parse::<f64>().ok()),
        );
        let q = match record {
            (Some(_t), Some(q)) => q,
            _ => {
                eprintln!("Error: could not read t and q from '{line}'");
                return 1;
            }
        };

        let noise: f64 = rng.sample(StandardNormal);
        if writeln!(stdout, "{}", format_full(q + sd * noise))
            .and_then(|()| stdout.flush())
            .is_err()
        {
            return 1;
        }
    }

    0
}
