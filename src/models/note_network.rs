use ndarray::{Array2, ArrayView2, Axis, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ComposerError, Result};
use crate::layers::dropout::Dropout;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm::{LstmGradients, LstmLayer, LstmStepCache};
use crate::loss::{softmax, LossKind};
use crate::model::SequenceModel;
use crate::optimizers::Optimizer;
use crate::windowing::Window;

/// Layer sizes and regularization for [`NoteNetwork`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Width of the linear projection applied to each one-hot note
    pub projection_size: usize,
    /// Hidden size of each stacked LSTM layer, bottom first
    pub lstm_hidden_sizes: Vec<usize>,
    /// Width of the dense layer between the LSTM stack and the output
    pub dense_size: usize,
    pub dropout: f64,
    pub clip_gradient: Option<f64>,
    pub loss: LossKind,
    /// Seed for weight init and dropout masks; entropy when unset
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            projection_size: 16,
            lstm_hidden_sizes: vec![128, 128],
            dense_size: 64,
            dropout: 0.3,
            clip_gradient: Some(5.0),
            loss: LossKind::CrossEntropy,
            seed: None,
        }
    }
}

/// Gradients for every layer of a [`NoteNetwork`]
#[derive(Clone, Debug)]
pub struct NetworkGradients {
    pub projection: LinearGradients,
    pub lstm: Vec<LstmGradients>,
    pub hidden: LinearGradients,
    pub output: LinearGradients,
}

impl NetworkGradients {
    fn scale(&mut self, factor: f64) {
        self.projection.scale(factor);
        self.lstm.iter_mut().for_each(|g| g.scale(factor));
        self.hidden.scale(factor);
        self.output.scale(factor);
    }

    fn clip(&mut self, max_norm: f64) {
        self.projection.clip(max_norm);
        self.lstm.iter_mut().for_each(|g| g.clip(max_norm));
        self.hidden.clip(max_norm);
        self.output.clip(max_norm);
    }
}

/// Everything one time step computed on the way up
struct StepTrace {
    one_hot: Array2<f64>,
    lstm_caches: Vec<LstmStepCache>,
    top: Array2<f64>,
    dropped: Array2<f64>,
    mask: Option<Array2<f64>>,
    logits: Array2<f64>,
}

/// Stacked LSTM next-note model.
///
/// one-hot(V) → Linear(V, projection) → LSTM × n → Linear(h, dense)
/// → Dropout → Linear(dense, V) → softmax
///
/// Hidden and cell state start at zero for every window. Dropout masks are
/// drawn only while training, so [`SequenceModel::predict`] is deterministic.
#[derive(Clone, Debug)]
pub struct NoteNetwork {
    pub(crate) projection: LinearLayer,
    pub(crate) lstm_layers: Vec<LstmLayer>,
    pub(crate) hidden: LinearLayer,
    pub(crate) dropout: Dropout,
    pub(crate) output: LinearLayer,
    pub(crate) vocab_size: usize,
    pub(crate) clip_gradient: Option<f64>,
    pub(crate) loss: LossKind,
    rng: StdRng,
}

impl NoteNetwork {
    pub fn new(vocab_size: usize, config: &NetworkConfig) -> Result<Self> {
        if vocab_size == 0 {
            return Err(ComposerError::invalid_config("vocabulary size must be positive"));
        }
        if config.lstm_hidden_sizes.is_empty() {
            return Err(ComposerError::invalid_config("network needs at least one LSTM layer"));
        }
        if config.projection_size == 0
            || config.dense_size == 0
            || config.lstm_hidden_sizes.contains(&0)
        {
            return Err(ComposerError::invalid_config("layer sizes must be positive"));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let projection = LinearLayer::new(vocab_size, config.projection_size, &mut rng);
        let mut lstm_layers = Vec::with_capacity(config.lstm_hidden_sizes.len());
        let mut input_size = config.projection_size;
        for &hidden_size in &config.lstm_hidden_sizes {
            lstm_layers.push(LstmLayer::new(input_size, hidden_size, &mut rng));
            input_size = hidden_size;
        }
        let hidden = LinearLayer::new(input_size, config.dense_size, &mut rng);
        let output = LinearLayer::new(config.dense_size, vocab_size, &mut rng);

        let network = NoteNetwork {
            projection,
            lstm_layers,
            hidden,
            dropout: Dropout::new(config.dropout),
            output,
            vocab_size,
            clip_gradient: config.clip_gradient,
            loss: config.loss,
            rng,
        };
        debug!(
            vocab_size,
            parameters = network.num_parameters(),
            "built note network"
        );
        Ok(network)
    }

    /// Reassemble a network from stored layers, checking they chain together
    pub(crate) fn from_parts(
        projection: LinearLayer,
        lstm_layers: Vec<LstmLayer>,
        hidden: LinearLayer,
        output: LinearLayer,
        dropout: f64,
        clip_gradient: Option<f64>,
        loss: LossKind,
    ) -> Result<Self> {
        let vocab_size = projection.input_size;
        let mut width = projection.output_size;
        if lstm_layers.is_empty() {
            return Err(ComposerError::shape("stored network has no LSTM layers"));
        }
        for (i, layer) in lstm_layers.iter().enumerate() {
            if layer.input_size != width {
                return Err(ComposerError::shape(format!(
                    "LSTM layer {} expects {} inputs, previous layer gives {}",
                    i, layer.input_size, width
                )));
            }
            width = layer.hidden_size;
        }
        if hidden.input_size != width
            || output.input_size != hidden.output_size
            || output.output_size != vocab_size
        {
            return Err(ComposerError::shape("stored dense layers do not match the LSTM stack"));
        }

        Ok(NoteNetwork {
            projection,
            lstm_layers,
            hidden,
            dropout: Dropout::new(dropout),
            output,
            vocab_size,
            clip_gradient,
            loss,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn num_parameters(&self) -> usize {
        self.projection.num_parameters()
            + self.lstm_layers.iter().map(|l| l.num_parameters()).sum::<usize>()
            + self.hidden.num_parameters()
            + self.output.num_parameters()
    }

    pub fn lstm_hidden_sizes(&self) -> Vec<usize> {
        self.lstm_layers.iter().map(|l| l.hidden_size).collect()
    }

    pub fn projection_size(&self) -> usize {
        self.projection.output_size
    }

    pub fn dense_size(&self) -> usize {
        self.hidden.output_size
    }

    fn one_hot(&self, note: usize) -> Result<Array2<f64>> {
        if note >= self.vocab_size {
            return Err(ComposerError::VocabularyTooSmall {
                vocab: self.vocab_size,
                max_note: note,
            });
        }
        let mut encoded: Array2<f64> = Array2::zeros((self.vocab_size, 1));
        encoded[[note, 0]] = 1.0;
        Ok(encoded)
    }

    /// Run a window through the network; `masks[t]` is the dropout mask for step `t`.
    fn forward_trace(
        &self,
        window: &[usize],
        masks: &[Option<Array2<f64>>],
    ) -> Result<Vec<StepTrace>> {
        if window.is_empty() {
            return Err(ComposerError::shape("cannot run an empty window"));
        }

        let mut states: Vec<(Array2<f64>, Array2<f64>)> =
            self.lstm_layers.iter().map(|l| l.zero_state()).collect();
        let mut traces = Vec::with_capacity(window.len());

        for (t, &note) in window.iter().enumerate() {
            let one_hot = self.one_hot(note)?;
            let mut current = self.projection.forward(&one_hot);
            let mut lstm_caches = Vec::with_capacity(self.lstm_layers.len());

            for (layer, state) in self.lstm_layers.iter().zip(states.iter_mut()) {
                let (h, c, cache) = layer.step(&current, &state.0, &state.1);
                lstm_caches.push(cache);
                current = h.clone();
                *state = (h, c);
            }

            let mask = masks.get(t).cloned().flatten();
            let dense = self.hidden.forward(&current);
            let dropped = Dropout::apply(&dense, mask.as_ref());
            let logits = self.output.forward(&dropped);

            traces.push(StepTrace {
                one_hot,
                lstm_caches,
                top: current,
                dropped,
                mask,
                logits,
            });
        }

        Ok(traces)
    }

    fn zero_gradients(&self) -> NetworkGradients {
        NetworkGradients {
            projection: self.projection.zero_gradients(),
            lstm: self.lstm_layers.iter().map(|l| l.zero_gradients()).collect(),
            hidden: self.hidden.zero_gradients(),
            output: self.output.zero_gradients(),
        }
    }

    /// Backpropagation through time for one window, adding into `grads`.
    /// Returns the summed loss over the window's time steps.
    fn accumulate_window(
        &self,
        traces: &[StepTrace],
        target: &Array2<f64>,
        grads: &mut NetworkGradients,
    ) -> f64 {
        let mut loss = 0.0;
        let (mut dh_next, mut dc_next): (Vec<Array2<f64>>, Vec<Array2<f64>>) =
            self.lstm_layers.iter().map(|l| l.zero_state()).unzip();

        for trace in traces.iter().rev() {
            loss += self.loss.loss(&trace.logits, target);
            let dlogits = self.loss.gradient(&trace.logits, target);

            let (g_output, d_dropped) = self.output.backward(&dlogits, &trace.dropped);
            grads.output.accumulate(&g_output);

            let d_dense = Dropout::apply(&d_dropped, trace.mask.as_ref());
            let (g_hidden, d_top) = self.hidden.backward(&d_dense, &trace.top);
            grads.hidden.accumulate(&g_hidden);

            // Walk down the stack; each layer also gets the gradient its h_t
            // received from step t+1.
            let mut d_from_above = d_top;
            for (l, layer) in self.lstm_layers.iter().enumerate().rev() {
                let dh = &d_from_above + &dh_next[l];
                let (g_layer, dx, dh_prev, dc_prev) =
                    layer.backward_step(&dh, &dc_next[l], &trace.lstm_caches[l]);
                grads.lstm[l].accumulate(&g_layer);
                dh_next[l] = dh_prev;
                dc_next[l] = dc_prev;
                d_from_above = dx;
            }

            let (g_projection, _) = self.projection.backward(&d_from_above, &trace.one_hot);
            grads.projection.accumulate(&g_projection);
        }

        loss
    }

    fn apply_gradients<O: Optimizer + ?Sized>(
        &mut self,
        grads: &NetworkGradients,
        optimizer: &mut O,
    ) {
        self.projection.update_parameters(&grads.projection, optimizer, "projection");
        for (i, (layer, g)) in self.lstm_layers.iter_mut().zip(grads.lstm.iter()).enumerate() {
            layer.update_parameters(g, optimizer, &format!("lstm_{}", i));
        }
        self.hidden.update_parameters(&grads.hidden, optimizer, "hidden");
        self.output.update_parameters(&grads.output, optimizer, "output");
    }
}

impl SequenceModel for NoteNetwork {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn train<O: Optimizer + ?Sized>(
        &mut self,
        windows: &[Window],
        targets: ArrayView2<f64>,
        optimizer: &mut O,
    ) -> Result<f64> {
        if windows.is_empty() {
            return Err(ComposerError::shape("training batch is empty"));
        }
        if targets.dim() != (self.vocab_size, windows.len()) {
            return Err(ComposerError::shape(format!(
                "targets are {:?}, expected ({}, {})",
                targets.dim(),
                self.vocab_size,
                windows.len()
            )));
        }

        let mut grads = self.zero_gradients();
        let mut total_loss = 0.0;
        let mut steps = 0usize;

        for (window, target) in windows.iter().zip(targets.axis_iter(Axis(1))) {
            let dense_size = self.hidden.output_size;
            let masks: Vec<Option<Array2<f64>>> = (0..window.len())
                .map(|_| self.dropout.sample_mask(Ix2(dense_size, 1), &mut self.rng))
                .collect();

            let traces = self.forward_trace(window, &masks)?;
            let target = target.to_owned().insert_axis(Axis(1));
            total_loss += self.accumulate_window(&traces, &target, &mut grads);
            steps += window.len();
        }

        grads.scale(1.0 / windows.len() as f64);
        if let Some(max_norm) = self.clip_gradient {
            grads.clip(max_norm);
        }
        self.apply_gradients(&grads, optimizer);

        Ok(total_loss / steps as f64)
    }

    fn predict(&self, window: &[usize]) -> Result<Array2<f64>> {
        let traces = self.forward_trace(window, &[])?;
        let mut distribution: Array2<f64> = Array2::zeros((self.vocab_size, traces.len()));
        for (t, trace) in traces.iter().enumerate() {
            distribution.column_mut(t).assign(&softmax(&trace.logits).column(0));
        }
        Ok(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::Adam;
    use crate::windowing::{build_input_windows, build_target_distributions};

    fn small_config(seed: u64) -> NetworkConfig {
        NetworkConfig {
            projection_size: 4,
            lstm_hidden_sizes: vec![8, 6],
            dense_size: 8,
            dropout: 0.0,
            clip_gradient: Some(5.0),
            loss: LossKind::CrossEntropy,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_predict_shape_and_normalization() {
        let network = NoteNetwork::new(5, &small_config(1)).unwrap();
        let dist = network.predict(&[0, 4, 2]).unwrap();

        assert_eq!(dist.dim(), (5, 3));
        for col in dist.axis_iter(Axis(1)) {
            assert!((col.sum() - 1.0).abs() < 1e-9);
            assert!(col.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_predict_is_deterministic_with_dropout() {
        let mut config = small_config(2);
        config.dropout = 0.5;
        let network = NoteNetwork::new(4, &config).unwrap();

        assert_eq!(network.predict(&[1, 2]).unwrap(), network.predict(&[1, 2]).unwrap());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = NoteNetwork::new(4, &small_config(9)).unwrap();
        let b = NoteNetwork::new(4, &small_config(9)).unwrap();
        assert_eq!(a.predict(&[3, 0]).unwrap(), b.predict(&[3, 0]).unwrap());
    }

    #[test]
    fn test_rejects_out_of_vocab_note() {
        let network = NoteNetwork::new(3, &small_config(3)).unwrap();
        assert!(matches!(
            network.predict(&[0, 3]),
            Err(ComposerError::VocabularyTooSmall { vocab: 3, max_note: 3 })
        ));
        assert!(network.predict(&[]).is_err());
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut config = small_config(4);
        config.lstm_hidden_sizes.clear();
        assert!(NoteNetwork::new(3, &config).is_err());
        assert!(NoteNetwork::new(0, &small_config(4)).is_err());
    }

    #[test]
    fn test_train_checks_target_shape() {
        let mut network = NoteNetwork::new(3, &small_config(5)).unwrap();
        let mut optimizer = Adam::new(0.01);
        let windows = vec![vec![0, 1]];
        let targets: Array2<f64> = Array2::zeros((3, 2));
        assert!(network.train(&windows, targets.view(), &mut optimizer).is_err());
    }

    #[test]
    fn test_training_learns_repeating_pattern() {
        let notes: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let windows = build_input_windows(&notes, 2).unwrap();
        let targets = build_target_distributions(&notes, 3, 2).unwrap();

        let mut network = NoteNetwork::new(3, &small_config(42)).unwrap();
        let mut optimizer = Adam::new(0.05);

        let initial = network.train(&windows, targets.view(), &mut optimizer).unwrap();
        let mut last = initial;
        for _ in 0..200 {
            last = network.train(&windows, targets.view(), &mut optimizer).unwrap();
        }

        assert!(last < initial * 0.3, "loss went from {} to {}", initial, last);
        let dist = network.predict(&[0, 1]).unwrap();
        assert_eq!(crate::utils::argmax(dist.column(1)), 2);
    }

    #[test]
    fn test_mean_squared_loss_trains() {
        let notes: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let windows = build_input_windows(&notes, 2).unwrap();
        let targets = build_target_distributions(&notes, 2, 2).unwrap();

        let mut config = small_config(7);
        config.loss = LossKind::MeanSquared;
        let mut network = NoteNetwork::new(2, &config).unwrap();
        let mut optimizer = Adam::new(0.05);

        let initial = network.train(&windows, targets.view(), &mut optimizer).unwrap();
        let mut last = initial;
        for _ in 0..150 {
            last = network.train(&windows, targets.view(), &mut optimizer).unwrap();
        }
        assert!(last < initial);
    }
}
