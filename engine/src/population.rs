use rand::{rngs::StdRng, Rng};

/// One generation's accepted particles with their importance weights and the
/// threshold that produced them.
///
/// A population is replaced wholesale at the end of a round; the previous
/// round's population is read-only input to perturbation and reweighting.
/// Weights are normalized to sum to one on construction.
#[derive(Clone, Debug)]
pub struct Population {
    pub particles: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub epsilon: f64,
}

impl Population {
    pub fn new(particles: Vec<Vec<f64>>, mut weights: Vec<f64>, epsilon: f64) -> Self {
        debug_assert_eq!(particles.len(), weights.len());
        normalize(&mut weights);

        Self {
            particles,
            weights,
            epsilon,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn cumulative_weights(&self) -> Vec<f64> {
        cumulative(&self.weights)
    }
}

pub fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();

    if sum > 0.0 {
        for weight in weights.iter_mut() {
            *weight /= sum;
        }
    }
}

pub fn cumulative(weights: &[f64]) -> Vec<f64> {
    let mut sum = 0.0;

    weights
        .iter()
        .map(|weight| {
            sum += weight;
            sum
        })
        .collect()
}

/// Draw an index with probability proportional to the weights behind the
/// normalized cumulative sum.  The final bin absorbs floating-point slack.
pub fn sample_index(cumulative: &[f64], rng: &mut StdRng) -> usize {
    debug_assert!(!cumulative.is_empty());

    let u: f64 = rng.gen();

    cumulative
        .iter()
        .position(|&bound| u <= bound)
        .unwrap_or(cumulative.len() - 1)
}

/// Importance weight of a perturbed particle accepted in generation t > 0:
/// the prior density over the weighted mixture of perturbation densities
/// from the previous population.
pub fn smc_weight(prior_density: f64, previous_weights: &[f64], kernel_densities: &[f64]) -> f64 {
    debug_assert_eq!(previous_weights.len(), kernel_densities.len());

    let denominator: f64 = previous_weights
        .iter()
        .zip(kernel_densities)
        .map(|(weight, density)| weight * density)
        .sum();

    prior_density / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn construction_normalizes_weights() {
        let population = Population::new(vec![vec![0.1], vec![0.2]], vec![2.0, 6.0], 0.5);

        assert_eq!(population.weights, vec![0.25, 0.75]);
        assert!((population.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cumulative_ends_at_one_for_normalized_weights() {
        let mut weights = vec![1.0, 1.0, 2.0];
        normalize(&mut weights);
        let bounds = cumulative(&weights);

        assert_eq!(bounds.len(), 3);
        assert!((bounds[2] - 1.0).abs() < 1e-12);
        assert!(bounds[0] < bounds[1] && bounds[1] < bounds[2]);
    }

    #[test]
    fn sampling_is_reproducible_with_a_seed() {
        let bounds = cumulative(&[0.25, 0.25, 0.5]);
        let mut first = StdRng::seed_from_u64(7);
        let mut second = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let a = sample_index(&bounds, &mut first);
            let b = sample_index(&bounds, &mut second);

            assert_eq!(a, b);
            assert!(a < 3);
        }
    }

    #[test]
    fn degenerate_weights_always_pick_the_carrier() {
        let bounds = cumulative(&[0.0, 1.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            assert_eq!(sample_index(&bounds, &mut rng), 1);
        }
    }

    #[test]
    fn weight_is_prior_over_kernel_mixture() {
        let weight = smc_weight(0.5, &[0.25, 0.75], &[2.0, 2.0]);
        assert!((weight - 0.25).abs() < 1e-12);

        // a far-away particle with vanishing kernel density gets a large weight
        let far = smc_weight(0.5, &[0.5, 0.5], &[1e-6, 1e-6]);
        assert!(far > 1e5);
    }
}
