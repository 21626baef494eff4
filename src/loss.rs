use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Loss over raw output logits, one column per sample
pub trait LossFunction {
    /// Compute the loss between logits and target distributions
    fn compute_loss(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> f64;

    /// Gradient of the loss with respect to the logits
    fn compute_gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64>;
}

/// Softmax followed by negative log-likelihood
pub struct CrossEntropyLoss;

impl LossFunction for CrossEntropyLoss {
    fn compute_loss(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let probs = softmax(logits);
        let epsilon = 1e-15;
        let log_probs = probs.mapv(|p| (p + epsilon).ln());
        -(targets * &log_probs).sum() / logits.ncols() as f64
    }

    fn compute_gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        (softmax(logits) - targets) / logits.ncols() as f64
    }
}

/// Mean squared error between the softmax distribution and the targets
///
/// The gradient is pulled back through the softmax Jacobian:
/// ∂L/∂z = p ⊙ (g - Σ g ⊙ p) with g = ∂L/∂p.
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let diff = softmax(logits) - targets;
        (&diff * &diff).sum() / diff.len() as f64
    }

    fn compute_gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let probs = softmax(logits);
        let grad_probs = 2.0 * (&probs - targets) / probs.len() as f64;
        let dot = (&grad_probs * &probs).sum_axis(Axis(0));
        &probs * &(&grad_probs - &dot.insert_axis(Axis(0)))
    }
}

/// Loss selection carried in network configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    #[default]
    CrossEntropy,
    MeanSquared,
}

impl LossKind {
    pub fn loss(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        match self {
            LossKind::CrossEntropy => CrossEntropyLoss.compute_loss(logits, targets),
            LossKind::MeanSquared => MSELoss.compute_loss(logits, targets),
        }
    }

    pub fn gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        match self {
            LossKind::CrossEntropy => CrossEntropyLoss.compute_gradient(logits, targets),
            LossKind::MeanSquared => MSELoss.compute_gradient(logits, targets),
        }
    }
}

/// Numerically stable column-wise softmax
pub fn softmax(x: &Array2<f64>) -> Array2<f64> {
    let mut result = x.clone();
    for mut col in result.axis_iter_mut(Axis(1)) {
        let max_val = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        col.mapv_inplace(|v| (v - max_val).exp());
        let sum = col.sum();
        col.mapv_inplace(|v| v / sum);
    }
    result
}
