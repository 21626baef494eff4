//! Accuracy of predicted notes and argmax extraction from distributions.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{ComposerError, Result};
use crate::utils::argmax;

/// Percentage of predicted notes equal to the rounded actual value.
///
/// Returns `Ok(None)` for empty inputs: accuracy over zero notes is undefined.
pub fn accuracy(predicted: &[usize], actual: &[f64]) -> Result<Option<f64>> {
    if predicted.len() != actual.len() {
        return Err(ComposerError::LengthMismatch {
            left: predicted.len(),
            right: actual.len(),
        });
    }
    if predicted.is_empty() {
        return Ok(None);
    }

    let matches = predicted
        .iter()
        .zip(actual)
        .filter(|&(&p, &a)| p as f64 == a.round())
        .count();

    Ok(Some(matches as f64 / predicted.len() as f64 * 100.0))
}

/// Most likely note at every time step of a `(vocab, steps)` distribution.
pub fn argmax_notes(distribution: ArrayView2<f64>) -> Vec<usize> {
    distribution
        .axis_iter(Axis(1))
        .map(argmax)
        .collect()
}

/// Most likely note after the final time step of each prediction.
pub fn final_step_notes(predictions: &[Array2<f64>]) -> Vec<usize> {
    predictions
        .iter()
        .map(|p| {
            let last = p.ncols().saturating_sub(1);
            argmax(p.column(last))
        })
        .collect()
}
