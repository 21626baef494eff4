//! Numeric helpers shared by layers and decoding.

use ndarray::{Array2, ArrayView1};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Index of the largest value (greedy decoding).
///
/// Ties resolve to the lowest index and NaN entries never win.
/// An empty view yields 0.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &val) in values.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_idx = idx;
        }
    }
    best_idx
}

/// Rescale a gradient matrix so its L2 norm does not exceed `max_norm`.
pub fn clip_norm(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_clip_norm() {
        let mut m = arr2(&[[3.0, 4.0]]);
        clip_norm(&mut m, 1.0);
        assert!((m[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((m[[0, 1]] - 0.8).abs() < 1e-12);

        let mut small = arr2(&[[0.1, 0.1]]);
        clip_norm(&mut small, 1.0);
        assert_eq!(small, arr2(&[[0.1, 0.1]]));
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(arr1(&[0.1, 0.7, 0.2]).view()), 1);
        assert_eq!(argmax(arr1(&[0.5, 0.5]).view()), 0);
        assert_eq!(argmax(arr1(&[f64::NAN, -1.0]).view()), 1);
    }
}
