//! Framing a flat note sequence into model inputs and targets.
//!
//! Windows slide with stride 1: window `j` covers `notes[j..j + L]` and its
//! target is the note right after it, `notes[j + L]`. A sequence of `N` notes
//! therefore yields exactly `N - L` windows, labels and one-hot columns, and
//! all three line up index for index.

use ndarray::Array2;

use crate::dataset::NoteSequence;
use crate::error::{ComposerError, Result};

/// A fixed-length run of consecutive notes fed to the model.
pub type Window = Vec<usize>;

fn check_window(sequence: &[usize], window_len: usize) -> Result<()> {
    if window_len == 0 {
        return Err(ComposerError::InvalidWindowLength);
    }
    if sequence.len() <= window_len {
        return Err(ComposerError::SequenceTooShort {
            len: sequence.len(),
            window: window_len,
        });
    }
    Ok(())
}

fn check_vocab(sequence: &[usize], vocab_size: usize) -> Result<()> {
    if let Some(&max_note) = sequence.iter().max() {
        if max_note >= vocab_size {
            return Err(ComposerError::VocabularyTooSmall {
                vocab: vocab_size,
                max_note,
            });
        }
    }
    Ok(())
}

/// Every window of `window_len` notes that has a following target note.
pub fn build_input_windows(sequence: &[usize], window_len: usize) -> Result<Vec<Window>> {
    check_window(sequence, window_len)?;
    Ok(sequence
        .windows(window_len)
        .take(sequence.len() - window_len)
        .map(|w| w.to_vec())
        .collect())
}

/// The note following each window, used only for evaluation.
pub fn build_target_labels(sequence: &[usize], window_len: usize) -> Result<Vec<usize>> {
    check_window(sequence, window_len)?;
    Ok(sequence[window_len..].to_vec())
}

/// One-hot target per window, shape `(vocab_size, N - L)`.
///
/// Column `j` is 1.0 at row `sequence[L + j]` and 0.0 elsewhere. The model is
/// trained against the same column at every time step of window `j`.
pub fn build_target_distributions(
    sequence: &[usize],
    vocab_size: usize,
    window_len: usize,
) -> Result<Array2<f64>> {
    check_window(sequence, window_len)?;
    check_vocab(sequence, vocab_size)?;

    let targets = &sequence[window_len..];
    let mut distributions = Array2::zeros((vocab_size, targets.len()));
    for (col, &note) in targets.iter().enumerate() {
        distributions[[note, col]] = 1.0;
    }
    Ok(distributions)
}

/// Windows, one-hot targets and scalar labels for one training run.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    pub windows: Vec<Window>,
    pub targets: Array2<f64>,
    pub labels: Vec<usize>,
    pub window_len: usize,
    pub vocab_size: usize,
}

impl TrainingSet {
    pub fn from_sequence(
        sequence: &NoteSequence,
        window_len: usize,
        vocab_size: usize,
    ) -> Result<Self> {
        let notes = sequence.notes();
        let targets = build_target_distributions(notes, vocab_size, window_len)?;
        let windows = build_input_windows(notes, window_len)?;
        let labels = build_target_labels(notes, window_len)?;

        Ok(Self {
            windows,
            targets,
            labels,
            window_len,
            vocab_size,
        })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Check that windows, target columns and labels line up, and that
    /// targets have one row per vocabulary entry.
    pub fn check_consistent(&self) -> Result<()> {
        let windows = self.windows.len();
        if self.labels.len() != windows {
            return Err(ComposerError::LengthMismatch {
                left: windows,
                right: self.labels.len(),
            });
        }
        if self.targets.dim() != (self.vocab_size, windows) {
            return Err(ComposerError::shape(format!(
                "targets are {:?}, expected ({}, {})",
                self.targets.dim(),
                self.vocab_size,
                windows
            )));
        }
        Ok(())
    }

    /// Labels as the real-valued "actual" series the accuracy metric expects.
    pub fn actual_values(&self) -> Vec<f64> {
        self.labels.iter().map(|&note| note as f64).collect()
    }
}
