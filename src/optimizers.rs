use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// State is keyed by parameter id and survives across calls until `reset`.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    /// Largest number of updates applied to any single parameter
    fn steps(&self) -> u64;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn steps(&self) -> u64 {
        (**self).steps()
    }
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    step_size: f64,
    steps: u64,
}

impl SGD {
    pub fn new(step_size: f64) -> Self {
        SGD { step_size, steps: 0 }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.step_size, gradient);
        self.steps += 1;
    }

    fn reset(&mut self) {
        self.steps = 0;
    }

    fn steps(&self) -> u64 {
        self.steps
    }
}

struct Moments {
    m: Array2<f64>,
    v: Array2<f64>,
    t: i32,
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected with each parameter's own step count.
pub struct Adam {
    step_size: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    moments: HashMap<String, Moments>,
}

impl Adam {
    pub fn new(step_size: f64) -> Self {
        Adam::with_params(step_size, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(step_size: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            step_size,
            beta1,
            beta2,
            epsilon,
            moments: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .moments
            .entry(param_id.to_string())
            .or_insert_with(|| Moments {
                m: Array2::zeros(param.raw_dim()),
                v: Array2::zeros(param.raw_dim()),
                t: 0,
            });
        state.t += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &(gradient * gradient);

        let m_correction = 1.0 - self.beta1.powi(state.t);
        let v_correction = 1.0 - self.beta2.powi(state.t);
        let epsilon = self.epsilon;
        let step_size = self.step_size;

        ndarray::Zip::from(param)
            .and(&state.m)
            .and(&state.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / m_correction;
                let v_hat = v / v_correction;
                *p -= step_size * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

    fn reset(&mut self) {
        self.moments.clear();
    }

    fn steps(&self) -> u64 {
        self.moments.values().map(|s| s.t as u64).max().unwrap_or(0)
    }
}

/// Optimizer selection carried in training configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// Build the configured optimizer behind a trait object
pub fn build_optimizer(kind: OptimizerKind, step_size: f64) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(step_size)),
        OptimizerKind::Sgd => Box::new(SGD::new(step_size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - 0.1 * &gradient;
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
        assert_eq!(optimizer.steps(), 1);
    }

    #[test]
    fn test_adam_first_step_moves_by_step_size() {
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0, -2.0]]);
        let gradient = arr2(&[[0.5, -0.3]]);

        optimizer.update("w", &mut param, &gradient);

        // Bias-corrected first step is ±η regardless of gradient scale
        assert!((param[[0, 0]] - 0.999).abs() < 1e-6);
        assert!((param[[0, 1]] + 1.999).abs() < 1e-6);
    }

    #[test]
    fn test_adam_step_count_is_per_parameter() {
        let mut optimizer = Adam::new(0.01);
        let mut a = arr2(&[[1.0]]);
        let mut b = arr2(&[[1.0]]);
        let g = arr2(&[[0.1]]);

        optimizer.update("a", &mut a, &g);
        optimizer.update("b", &mut b, &g);
        optimizer.update("a", &mut a, &g);

        assert_eq!(optimizer.steps(), 2);

        optimizer.reset();
        assert_eq!(optimizer.steps(), 0);
    }

    #[test]
    fn test_boxed_optimizer_delegates() {
        let mut optimizer = build_optimizer(OptimizerKind::Sgd, 0.5);
        let mut param = arr2(&[[1.0]]);
        optimizer.update("p", &mut param, &arr2(&[[1.0]]));
        assert!((param[[0, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(optimizer.steps(), 1);
    }
}
