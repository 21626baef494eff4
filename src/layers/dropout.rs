use ndarray::{Array2, Ix2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

/// Inverted dropout applied during training only.
///
/// A mask holds `1 / keep_prob` for kept units and 0 for dropped ones, so
/// expected activations match evaluation mode where nothing is dropped.
#[derive(Clone, Copy, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
}

impl Dropout {
    /// Rates outside `[0, 1)` are clamped into range.
    pub fn new(dropout_rate: f64) -> Self {
        Dropout {
            dropout_rate: dropout_rate.clamp(0.0, 0.999),
        }
    }

    /// Sample a fresh mask, or `None` when dropout is disabled.
    pub fn sample_mask<R: Rng + ?Sized>(&self, shape: Ix2, rng: &mut R) -> Option<Array2<f64>> {
        if self.dropout_rate == 0.0 {
            return None;
        }
        let keep_prob = 1.0 - self.dropout_rate;
        let mask = Array2::random_using(shape, Uniform::new(0.0, 1.0), rng)
            .mapv(|x| if x < keep_prob { 1.0 / keep_prob } else { 0.0 });
        Some(mask)
    }

    /// Apply a sampled mask; identity when no mask was drawn.
    pub fn apply(input: &Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => input * mask,
            None => input.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_rate_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let dropout = Dropout::new(0.0);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0]]);

        let mask = dropout.sample_mask(input.raw_dim(), &mut rng);
        assert!(mask.is_none());
        assert_eq!(Dropout::apply(&input, mask.as_ref()), input);
    }

    #[test]
    fn test_mask_values() {
        let mut rng = StdRng::seed_from_u64(5);
        let dropout = Dropout::new(0.5);
        let mask = dropout.sample_mask(Ix2(20, 20), &mut rng).unwrap();

        assert!(mask.iter().all(|&m| m == 0.0 || (m - 2.0).abs() < 1e-12));
        assert!(mask.iter().any(|&m| m == 0.0));
        assert!(mask.iter().any(|&m| m > 0.0));
    }
}
