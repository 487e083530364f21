//! Shared pieces of the demo collaborator programs: the densities they
//! evaluate and the output formatting they all use.

use rand::{rngs::StdRng, SeedableRng};

/// Density of the uniform distribution on `[a, b]`.
pub fn uniform_pdf(a: f64, b: f64, x: f64) -> f64 {
    if a <= x && x <= b {
        1.0 / (b - a)
    } else {
        0.0
    }
}

/// Density of the normal distribution with the given mean and standard
/// deviation.
pub fn normal_pdf(mean: f64, sd: f64, x: f64) -> f64 {
    let z = (x - mean) / sd;

    (-0.5 * z * z).exp() / (sd * (2.0 * std::f64::consts::PI).sqrt())
}

/// Format with full double precision (17 significant digits).
pub fn format_full(value: f64) -> String {
    format!("{value:.16e}")
}

/// RNG seeded from the optional trailing SEED argument, or from entropy.
pub fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_density_is_inverse_width_inside_the_interval() {
        for (a, b) in [(0.0, 1.0), (-2.0, 3.0), (0.25, 0.5)] {
            let inside = a + (b - a) * 0.3;

            assert_eq!(uniform_pdf(a, b, inside), 1.0 / (b - a));
            assert_eq!(uniform_pdf(a, b, a), 1.0 / (b - a));
            assert_eq!(uniform_pdf(a, b, b), 1.0 / (b - a));
        }
    }

    #[test]
    fn uniform_density_vanishes_outside_the_interval() {
        assert_eq!(uniform_pdf(0.0, 1.0, -0.001), 0.0);
        assert_eq!(uniform_pdf(0.0, 1.0, 1.001), 0.0);
    }

    #[test]
    fn normal_density_peaks_at_the_mean() {
        let peak = normal_pdf(2.0, 0.5, 2.0);

        assert!((peak - 1.0 / (0.5 * (2.0 * std::f64::consts::PI).sqrt())).abs() < 1e-12);
        assert!(normal_pdf(2.0, 0.5, 2.5) < peak);
        assert!((normal_pdf(2.0, 0.5, 1.5) - normal_pdf(2.0, 0.5, 2.5)).abs() < 1e-12);
    }

    #[test]
    fn full_precision_output_round_trips() {
        let value = 0.1234567890123456;
        let parsed: f64 = format_full(value).parse().unwrap();

        assert_eq!(parsed, value);
    }

    #[test]
    fn seeded_rngs_agree() {
        use rand::Rng;

        let mut first = rng_from(Some(11));
        let mut second = rng_from(Some(11));

        for _ in 0..10 {
            assert_eq!(first.gen::<u64>(), second.gen::<u64>());
        }
    }
}
