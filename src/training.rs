use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ComposerError, Result};
use crate::metrics::{accuracy, final_step_notes};
use crate::model::SequenceModel;
use crate::optimizers::{Optimizer, OptimizerKind};
use crate::windowing::TrainingSet;

/// Configuration for the fixed-budget training schedule
///
/// Training always runs `cycles` passes; there is no convergence stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub cycles: usize,
    /// Optimizer steps per cycle, each over one mini-batch
    pub steps_per_cycle: usize,
    pub batch_size: usize,
    pub step_size: f64,
    pub optimizer: OptimizerKind,
    /// Log predicted and actual notes after every cycle at debug level
    pub log_predictions: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            cycles: 20,
            steps_per_cycle: 5,
            batch_size: 5,
            step_size: 1e-3,
            optimizer: OptimizerKind::Adam,
            log_predictions: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ComposerError::invalid_config("batch_size must be at least 1"));
        }
        if self.cycles > 0 && self.steps_per_cycle == 0 {
            return Err(ComposerError::invalid_config("steps_per_cycle must be at least 1"));
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(ComposerError::invalid_config("step_size must be a positive number"));
        }
        Ok(())
    }
}

/// Metrics recorded after each training cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleMetrics {
    pub cycle: usize,
    pub mean_loss: f64,
    /// `None` when there was nothing to score
    pub accuracy: Option<f64>,
    pub elapsed_secs: f64,
}

/// Drives a model through repeated training cycles with one long-lived optimizer.
///
/// The optimizer is never reset between cycles, so each cycle continues from
/// the moment estimates left by the previous one.
pub struct CycleTrainer<M: SequenceModel, O: Optimizer> {
    model: M,
    optimizer: O,
    config: TrainingConfig,
    cursor: usize,
    metrics_history: Vec<CycleMetrics>,
}

impl<M: SequenceModel, O: Optimizer> CycleTrainer<M, O> {
    pub fn new(model: M, optimizer: O, config: TrainingConfig) -> Self {
        CycleTrainer {
            model,
            optimizer,
            config,
            cursor: 0,
            metrics_history: Vec::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Indices of the next mini-batch; wraps around the data and carries
    /// over into the next cycle.
    fn next_batch(&mut self, len: usize) -> Vec<usize> {
        let batch: Vec<usize> = (0..self.config.batch_size.min(len))
            .map(|i| (self.cursor + i) % len)
            .collect();
        self.cursor = (self.cursor + batch.len()) % len;
        batch
    }

    fn check_set(&self, set: &TrainingSet) -> Result<()> {
        if set.is_empty() {
            return Err(ComposerError::invalid_config("training set has no windows"));
        }
        set.check_consistent()?;
        if set.vocab_size != self.model.vocab_size() {
            return Err(ComposerError::shape(format!(
                "training set vocabulary {} does not match model vocabulary {}",
                set.vocab_size,
                self.model.vocab_size()
            )));
        }
        Ok(())
    }

    /// One cycle: `steps_per_cycle` optimizer steps, returning the mean loss
    pub fn train_cycle(&mut self, set: &TrainingSet) -> Result<f64> {
        self.config.validate()?;
        self.check_set(set)?;

        let mut loss_sum = 0.0;
        for _ in 0..self.config.steps_per_cycle {
            let batch = self.next_batch(set.len());
            let windows: Vec<_> = batch.iter().map(|&i| set.windows[i].clone()).collect();
            let targets = set.targets.select(ndarray::Axis(1), &batch);
            loss_sum += self.model.train(&windows, targets.view(), &mut self.optimizer)?;
        }
        Ok(loss_sum / self.config.steps_per_cycle.max(1) as f64)
    }

    /// Accuracy of the final-step prediction over every training window.
    /// `None` when the set has no windows to score.
    pub fn evaluate(&self, set: &TrainingSet) -> Result<Option<f64>> {
        let predictions = set
            .windows
            .iter()
            .map(|window| self.model.predict(window))
            .collect::<Result<Vec<_>>>()?;
        let predicted = final_step_notes(&predictions);

        if self.config.log_predictions {
            debug!(?predicted, "predicted notes");
            debug!(actual = ?set.labels, "actual notes");
        }

        let score = accuracy(&predicted, &set.actual_values())?;
        if score.is_none() {
            warn!("no windows to score, accuracy undefined");
        }
        Ok(score)
    }

    /// Run every configured cycle, logging accuracy after each one.
    pub fn run(&mut self, set: &TrainingSet) -> Result<&[CycleMetrics]> {
        self.config.validate()?;
        self.check_set(set)?;

        info!(
            cycles = self.config.cycles,
            windows = set.len(),
            batch_size = self.config.batch_size,
            "starting training"
        );

        for _ in 0..self.config.cycles {
            let start_time = Instant::now();
            let mean_loss = self.train_cycle(set)?;
            let train_accuracy = self.evaluate(set)?;
            let cycle = self.metrics_history.len();

            if let Some(acc) = train_accuracy {
                info!(
                    "cycle {} - loss = {:.6}, accuracy = {:.2}%",
                    cycle, mean_loss, acc
                );
            }

            self.metrics_history.push(CycleMetrics {
                cycle,
                mean_loss,
                accuracy: train_accuracy,
                elapsed_secs: start_time.elapsed().as_secs_f64(),
            });
        }

        info!("training completed");
        Ok(&self.metrics_history)
    }

    pub fn latest_metrics(&self) -> Option<&CycleMetrics> {
        self.metrics_history.last()
    }

    pub fn metrics_history(&self) -> &[CycleMetrics] {
        &self.metrics_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::NoteSequence;
    use crate::optimizers::SGD;
    use crate::windowing::Window;
    use ndarray::{Array2, ArrayView2};

    /// Records every batch it is trained on and always predicts `note`.
    struct RecordingModel {
        vocab: usize,
        note: usize,
        batches: Vec<Vec<Window>>,
    }

    impl SequenceModel for RecordingModel {
        fn vocab_size(&self) -> usize {
            self.vocab
        }

        fn train<O: Optimizer + ?Sized>(
            &mut self,
            windows: &[Window],
            targets: ArrayView2<f64>,
            optimizer: &mut O,
        ) -> Result<f64> {
            assert_eq!(targets.ncols(), windows.len());
            let mut param = Array2::zeros((1, 1));
            optimizer.update("p", &mut param, &Array2::ones((1, 1)));
            self.batches.push(windows.to_vec());
            Ok(1.0)
        }

        fn predict(&self, window: &[usize]) -> Result<Array2<f64>> {
            let mut dist: Array2<f64> = Array2::zeros((self.vocab, window.len()));
            dist.row_mut(self.note).fill(1.0);
            Ok(dist)
        }
    }

    fn training_set() -> TrainingSet {
        let sequence = NoteSequence::from_notes(vec![0, 1, 2, 1, 0, 1, 2]);
        TrainingSet::from_sequence(&sequence, 2, 3).unwrap()
    }

    fn config(cycles: usize) -> TrainingConfig {
        TrainingConfig {
            cycles,
            steps_per_cycle: 2,
            batch_size: 2,
            step_size: 0.1,
            optimizer: OptimizerKind::Sgd,
            log_predictions: true,
        }
    }

    #[test]
    fn test_runs_fixed_number_of_cycles() {
        let model = RecordingModel { vocab: 3, note: 1, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(4));

        let history = trainer.run(&training_set()).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].cycle, 3);
        assert_eq!(trainer.model().batches.len(), 8);
    }

    #[test]
    fn test_optimizer_state_carries_across_cycles() {
        let model = RecordingModel { vocab: 3, note: 1, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(3));
        trainer.run(&training_set()).unwrap();

        // 3 cycles × 2 steps, never reset
        assert_eq!(trainer.optimizer().steps(), 6);
    }

    #[test]
    fn test_batches_wrap_and_continue() {
        let model = RecordingModel { vocab: 3, note: 1, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(2));
        let set = training_set();
        trainer.run(&set).unwrap();

        let seen: Vec<Window> = trainer.model().batches.iter().flatten().cloned().collect();
        // 5 windows, 8 draws: indices 0,1,2,3,4,0,1,2
        assert_eq!(seen[4], set.windows[4]);
        assert_eq!(seen[5], set.windows[0]);
        assert_eq!(seen[7], set.windows[2]);
    }

    #[test]
    fn test_accuracy_from_constant_model() {
        let model = RecordingModel { vocab: 3, note: 1, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(1));
        trainer.run(&training_set()).unwrap();

        // labels are [2, 1, 0, 1, 2]; a constant 1 gets two right
        let acc = trainer.latest_metrics().unwrap().accuracy.unwrap();
        assert!((acc - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_vocab_mismatch_and_bad_config() {
        let model = RecordingModel { vocab: 4, note: 0, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(1));
        assert!(trainer.run(&training_set()).is_err());

        let mut bad = config(1);
        bad.batch_size = 0;
        let model = RecordingModel { vocab: 3, note: 0, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), bad);
        assert!(matches!(trainer.run(&training_set()), Err(ComposerError::InvalidConfig { .. })));
    }

    #[test]
    fn test_train_cycle_rejects_empty_and_ragged_sets() {
        let model = RecordingModel { vocab: 3, note: 0, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(1));

        let empty = TrainingSet {
            windows: Vec::new(),
            targets: Array2::zeros((3, 0)),
            labels: Vec::new(),
            window_len: 2,
            vocab_size: 3,
        };
        assert!(trainer.train_cycle(&empty).is_err());
        assert!(trainer.run(&empty).is_err());
        assert_eq!(trainer.evaluate(&empty).unwrap(), None);

        let mut ragged = training_set();
        ragged.windows.push(vec![0, 1]);
        assert!(trainer.train_cycle(&ragged).is_err());
        assert!(trainer.run(&ragged).is_err());
        assert!(trainer.model().batches.is_empty());
    }

    #[test]
    fn test_zero_cycles_does_nothing() {
        let model = RecordingModel { vocab: 3, note: 0, batches: Vec::new() };
        let mut trainer = CycleTrainer::new(model, SGD::new(0.1), config(0));
        assert!(trainer.run(&training_set()).unwrap().is_empty());
        assert!(trainer.latest_metrics().is_none());
    }
}
