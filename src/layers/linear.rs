use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::optimizers::Optimizer;
use crate::utils::clip_norm;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn accumulate(&mut self, other: &LinearGradients) {
        self.weight += &other.weight;
        self.bias += &other.bias;
    }

    pub fn scale(&mut self, factor: f64) {
        self.weight *= factor;
        self.bias *= factor;
    }

    pub fn clip(&mut self, max_norm: f64) {
        clip_norm(&mut self.weight, max_norm);
        clip_norm(&mut self.bias, max_norm);
    }
}

/// Fully connected layer: output = weight · input + bias
///
/// Weight has shape (output_size, input_size) and bias (output_size, 1).
/// Inputs are column vectors, or several columns at once.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Xavier/Glorot uniform initialization with zero bias
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let range = (6.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random_using(
            (output_size, input_size),
            Uniform::new(-range, range),
            rng,
        );
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Option<Self> {
        let (output_size, input_size) = weight.dim();
        if bias.dim() != (output_size, 1) {
            return None;
        }
        Some(Self {
            weight,
            bias,
            input_size,
            output_size,
        })
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.weight.dot(input) + &self.bias
    }

    /// Backward pass given the input that produced `grad_output`.
    ///
    /// Returns (parameter_gradients, input_gradient).
    pub fn backward(
        &self,
        grad_output: &Array2<f64>,
        input: &Array2<f64>,
    ) -> (LinearGradients, Array2<f64>) {
        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let input_grad = self.weight.t().dot(grad_output);
        (gradients, input_grad)
    }

    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &LinearGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_layer_creation() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LinearLayer::new(10, 5, &mut rng);
        assert_eq!(layer.weight.shape(), &[5, 10]);
        assert_eq!(layer.bias.shape(), &[5, 1]);
        assert_eq!(layer.num_parameters(), 55);
    }

    #[test]
    fn test_forward_known_weights() {
        let weight = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let layer = LinearLayer::from_weights(weight, arr2(&[[0.5], [-0.5]])).unwrap();
        let output = layer.forward(&arr2(&[[1.0], [1.0]]));
        assert_eq!(output, arr2(&[[3.5], [6.5]]));
    }

    #[test]
    fn test_backward_and_update() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut layer = LinearLayer::new(2, 1, &mut rng);
        let mut optimizer = SGD::new(0.1);

        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);
        let before = (&layer.forward(&input) - &target).mapv(|x| x * x).sum();

        let grad_output = 2.0 * (&layer.forward(&input) - &target);
        let (gradients, input_grad) = layer.backward(&grad_output, &input);
        assert_eq!(gradients.weight.shape(), &[1, 2]);
        assert_eq!(input_grad.shape(), &[2, 1]);

        layer.update_parameters(&gradients, &mut optimizer, "linear");
        let after = (&layer.forward(&input) - &target).mapv(|x| x * x).sum();
        assert!(after < before);
    }

    #[test]
    fn test_from_weights_rejects_bad_bias() {
        assert!(LinearLayer::from_weights(Array2::zeros((2, 3)), Array2::zeros((3, 1))).is_none());
    }
}
