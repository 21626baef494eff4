use ndarray::{s, Array2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::optimizers::Optimizer;
use crate::utils::{clip_norm, sigmoid};

/// Gradients for one LSTM layer, accumulated over time steps and windows
#[derive(Clone, Debug)]
pub struct LstmGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LstmGradients {
    pub fn accumulate(&mut self, other: &LstmGradients) {
        self.w_ih += &other.w_ih;
        self.w_hh += &other.w_hh;
        self.bias += &other.bias;
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_ih *= factor;
        self.w_hh *= factor;
        self.bias *= factor;
    }

    pub fn clip(&mut self, max_norm: f64) {
        clip_norm(&mut self.w_ih, max_norm);
        clip_norm(&mut self.w_hh, max_norm);
        clip_norm(&mut self.bias, max_norm);
    }
}

/// Values from one forward step needed to run that step backward
#[derive(Clone, Debug)]
pub struct LstmStepCache {
    pub input: Array2<f64>,
    pub h_prev: Array2<f64>,
    pub c_prev: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub c: Array2<f64>,
}

/// One LSTM layer, stepped one time step at a time.
///
/// - i_t = σ(W_xi x_t + W_hi h_t-1 + b_i)
/// - f_t = σ(W_xf x_t + W_hf h_t-1 + b_f)
/// - g_t = tanh(W_xg x_t + W_hg h_t-1 + b_g)
/// - o_t = σ(W_xo x_t + W_ho h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
///
/// Gate rows are stacked in the order [input, forget, cell, output].
#[derive(Clone, Debug)]
pub struct LstmLayer {
    pub w_ih: Array2<f64>, // (4*hidden_size, input_size)
    pub w_hh: Array2<f64>, // (4*hidden_size, hidden_size)
    pub bias: Array2<f64>, // (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
}

impl LstmLayer {
    /// Uniform(-0.1, 0.1) weights, zero bias except a forget-gate bias of 1.0
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-0.1, 0.1);
        let w_ih = Array2::random_using((4 * hidden_size, input_size), dist, rng);
        let w_hh = Array2::random_using((4 * hidden_size, hidden_size), dist, rng);
        let mut bias: Array2<f64> = Array2::zeros((4 * hidden_size, 1));
        bias.slice_mut(s![hidden_size..2 * hidden_size, ..]).fill(1.0);

        LstmLayer {
            w_ih,
            w_hh,
            bias,
            input_size,
            hidden_size,
        }
    }

    /// Rebuild a layer from stored parameters
    pub fn from_weights(w_ih: Array2<f64>, w_hh: Array2<f64>, bias: Array2<f64>) -> Option<Self> {
        let (gate_rows, input_size) = w_ih.dim();
        if gate_rows % 4 != 0 {
            return None;
        }
        let hidden_size = gate_rows / 4;
        if w_hh.dim() != (gate_rows, hidden_size) || bias.dim() != (gate_rows, 1) {
            return None;
        }
        Some(LstmLayer {
            w_ih,
            w_hh,
            bias,
            input_size,
            hidden_size,
        })
    }

    /// Zeroed (hidden, cell) state for the start of a window
    pub fn zero_state(&self) -> (Array2<f64>, Array2<f64>) {
        (
            Array2::zeros((self.hidden_size, 1)),
            Array2::zeros((self.hidden_size, 1)),
        )
    }

    pub fn step(
        &self,
        input: &Array2<f64>,
        h_prev: &Array2<f64>,
        c_prev: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>, LstmStepCache) {
        let h = self.hidden_size;
        let gates = self.w_ih.dot(input) + self.w_hh.dot(h_prev) + &self.bias;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(f64::tanh);
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        let c = &forget_gate * c_prev + &input_gate * &cell_gate;
        let h_new = &output_gate * &c.mapv(f64::tanh);

        let cache = LstmStepCache {
            input: input.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            c: c.clone(),
        };

        (h_new, c, cache)
    }

    /// Backward through one step.
    ///
    /// `dh` and `dc` are the total gradients reaching this step's outputs.
    /// Returns (parameter_gradients, input_gradient, h_prev_gradient, c_prev_gradient).
    pub fn backward_step(
        &self,
        dh: &Array2<f64>,
        dc: &Array2<f64>,
        cache: &LstmStepCache,
    ) -> (LstmGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        let tanh_c = cache.c.mapv(f64::tanh);

        // ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let do_raw = dh * &tanh_c * &cache.output_gate.mapv(|o| o * (1.0 - o));

        // Cell gradient from h_t plus whatever flows back from c_t+1
        let dc_total = dc + &(dh * &cache.output_gate * &tanh_c.mapv(|t| 1.0 - t * t));

        let df_raw = &dc_total * &cache.c_prev * &cache.forget_gate.mapv(|f| f * (1.0 - f));
        let di_raw = &dc_total * &cache.cell_gate * &cache.input_gate.mapv(|i| i * (1.0 - i));
        let dg_raw = &dc_total * &cache.input_gate * &cache.cell_gate.mapv(|g| 1.0 - g * g);

        let mut dgates: Array2<f64> = Array2::zeros((4 * h, 1));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        let gradients = LstmGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.h_prev.t()),
            bias: dgates.clone(),
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dh_prev = self.w_hh.t().dot(&dgates);
        let dc_prev = &dc_total * &cache.forget_gate;

        (gradients, dx, dh_prev, dc_prev)
    }

    pub fn zero_gradients(&self) -> LstmGradients {
        LstmGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &LstmGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lstm_step_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmLayer::new(3, 2, &mut rng);

        let input = arr2(&[[0.5], [0.1], [-0.3]]);
        let (h0, c0) = layer.zero_state();
        let (h, c, cache) = layer.step(&input, &h0, &c0);

        assert_eq!(h.shape(), &[2, 1]);
        assert_eq!(c.shape(), &[2, 1]);
        assert_eq!(cache.input_gate.shape(), &[2, 1]);
        assert_eq!(layer.num_parameters(), 8 * 3 + 8 * 2 + 8);
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let layer = LstmLayer::new(2, 3, &mut rng);

        let input = arr2(&[[1.0], [0.5]]);
        let h_prev = arr2(&[[0.1], [0.2], [0.3]]);
        let c_prev = arr2(&[[0.0], [0.0], [0.0]]);
        let (_, _, cache) = layer.step(&input, &h_prev, &c_prev);

        let dh = arr2(&[[1.0], [1.0], [1.0]]);
        let dc = Array2::zeros((3, 1));
        let (grads, dx, dh_prev, dc_prev) = layer.backward_step(&dh, &dc, &cache);

        assert_eq!(grads.w_ih.shape(), &[12, 2]);
        assert_eq!(grads.w_hh.shape(), &[12, 3]);
        assert_eq!(grads.bias.shape(), &[12, 1]);
        assert_eq!(dx.shape(), &[2, 1]);
        assert_eq!(dh_prev.shape(), &[3, 1]);
        assert_eq!(dc_prev.shape(), &[3, 1]);
    }

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = LstmLayer::new(2, 2, &mut rng);
        let (h0, c0) = layer.zero_state();
        let input = arr2(&[[0.4], [-0.7]]);

        // Loss = sum(h_t)
        let (_, _, cache) = layer.step(&input, &h0, &c0);
        let ones = Array2::ones((2, 1));
        let (_, dx, _, _) = layer.backward_step(&ones, &Array2::zeros((2, 1)), &cache);

        let eps = 1e-6;
        for row in 0..2 {
            let mut plus = input.clone();
            plus[[row, 0]] += eps;
            let mut minus = input.clone();
            minus[[row, 0]] -= eps;
            let (hp, _, _) = layer.step(&plus, &h0, &c0);
            let (hm, _, _) = layer.step(&minus, &h0, &c0);
            let numeric = (hp.sum() - hm.sum()) / (2.0 * eps);
            assert!((numeric - dx[[row, 0]]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_from_weights_rejects_bad_shapes() {
        let w_ih = Array2::zeros((8, 3));
        let w_hh = Array2::zeros((8, 2));
        let bias = Array2::zeros((8, 1));
        assert!(LstmLayer::from_weights(w_ih.clone(), w_hh, bias.clone()).is_some());
        assert!(LstmLayer::from_weights(w_ih, Array2::zeros((8, 3)), bias).is_none());
    }
}
