use abacus_demos::{format_full, rng_from};
use rand::Rng;
use std::{
    io::{self, BufRead, Write},
    process::exit,
};

const NUM_FLIPS: u32 = 20;

fn main() {
    exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} OBSERVED_HEADS [SEED]", args[0]);
        eprintln!("Read 'epsilon q' records from stdin, flip {NUM_FLIPS} biased");
        eprintln!("coins with P(heads) = q and print the distance between the");
        eprintln!("simulated and observed head counts");
        return 2;
    }

    let observed: u32 = match args[1].parse() {
        Ok(observed) if observed <= NUM_FLIPS => observed,
        _ => {
            eprintln!("Error: OBSERVED_HEADS must be an integer between 0 and {NUM_FLIPS}");
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
            tokens.next().and_then(|e| e.parse::<f64>().ok()),
            tokens.next().and_then(|q| q.parse::<f64>().ok()),
        );
        let q = match record {
            (Some(_epsilon), Some(q)) if (0.0..=1.0).contains(&q) => q,
            _ => {
                eprintln!("Error: could not read epsilon and q from '{line}'");
                return 1;
            }
        };

        let heads = (0..NUM_FLIPS).filter(|_| rng.gen::<f64>() < q).count() as f64;
        let distance = (heads - observed as f64).abs();

        if writeln!(stdout, "{}", format_full(distance))
            .and_then(|()| stdout.flush())
            .is_err()
        {
            return 1;
        }
    }

    0
}
