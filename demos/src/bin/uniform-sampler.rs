use abacus_demos::{format_full, rng_from};
use rand::Rng;
use std::process::exit;

fn main() {
    exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} LOW HIGH [SEED]", args[0]);
        eprintln!("Sample one value from the uniform distribution on [LOW, HIGH]");
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

    let seed = match args.get(3).map(|raw| raw.parse::<u64>()) {
        None => None,
        Some(Ok(seed)) => Some(seed),
        Some(Err(_)) => {
            eprintln!("Error: SEED must be a non-negative integer");
            return 2;
        }
    };

    let mut rng = rng_from(seed);
    println!("{}", format_full(rng.gen_range(low..high)));

    0
}
