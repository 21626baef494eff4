//! The seam between the training/composition logic and a trainable model.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::optimizers::Optimizer;
use crate::windowing::Window;

/// A next-note model that can be trained on windows and queried for
/// per-step note distributions.
///
/// Implemented by [`crate::models::note_network::NoteNetwork`]; tests use
/// small stubs with fixed outputs.
pub trait SequenceModel {
    /// Number of distinct notes the model predicts over.
    fn vocab_size(&self) -> usize;

    /// One optimizer step over a mini-batch.
    ///
    /// `targets` has one `(vocab_size)` column per window. The optimizer is
    /// passed in so its state survives between calls. Returns the mean loss.
    fn train<O: Optimizer + ?Sized>(
        &mut self,
        windows: &[Window],
        targets: ArrayView2<f64>,
        optimizer: &mut O,
    ) -> Result<f64>;

    /// Note distribution after each time step of `window`, shape
    /// `(vocab_size, window.len())`. Does not change the model.
    fn predict(&self, window: &[usize]) -> Result<Array2<f64>>;
}
