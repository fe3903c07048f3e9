use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson, StandardNormal};

/// Seeded random source shared by every stochastic decision in a run.
///
/// The model owns one stream and lends it to agents in a fixed order, so a
/// given seed always replays the same trajectory.
#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: StdRng,
}

impl RandomStream {
    pub fn seeded(seed: u64) -> Self {
        RandomStream {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Bernoulli trial; probabilities outside [0, 1] saturate
    pub fn chance(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }

    /// Uniform draw in [low, high); returns `low` for an empty interval
    pub fn range(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..high)
    }

    pub fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        mean + sd * z
    }

    /// Normal draw clamped into [min, max]
    pub fn bounded_normal(&mut self, mean: f64, sd: f64, min: f64, max: f64) -> f64 {
        self.normal(mean, sd).clamp(min, max)
    }

    /// Poisson count with mean `lambda`; zero for a non-positive mean
    pub fn poisson(&mut self, lambda: f64) -> usize {
        if lambda <= 0.0 || !lambda.is_finite() {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(dist) => {
                let draw: f64 = dist.sample(&mut self.rng);
                draw as usize
            }
            Err(_) => 0,
        }
    }

    /// Uniform index into a collection of `len` items
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.rng.random_range(0..len))
        }
    }

    /// `amount` distinct indices from `0..len`, in draw order
    pub fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.rng, len, amount.min(len)).into_vec()
    }

    /// Index drawn proportionally to non-negative weights
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        let mut target = self.uniform() * total;
        let mut last_positive = None;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if target < *w {
                return Some(i);
            }
            target -= w;
            last_positive = Some(i);
        }
        // Rounding can leave a sliver of mass past the final bucket
        last_positive
    }
}
