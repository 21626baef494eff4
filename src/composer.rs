//! Autoregressive composition: seed a window with random notes, then keep
//! feeding the model's own argmax predictions back in until the requested
//! number of notes has been produced.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ComposerError, Result};
use crate::metrics::argmax_notes;
use crate::model::SequenceModel;
use crate::utils::argmax;
use crate::windowing::Window;

/// Upper bound on the output buffer reserved up front; longer compositions
/// grow as they go.
const PREALLOCATED_NOTES: usize = 4096;

/// How the input window changes after each prediction round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowUpdate {
    /// Append the last-step note and drop the oldest; one note per round
    #[default]
    ShiftAppend,
    /// Emit the argmax of every step and use those notes as the next window;
    /// `sequence_length` notes per round
    ReplaceWindow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Number of notes to compose
    pub length: usize,
    /// Context window length fed to the model
    pub sequence_length: usize,
    /// Seed for the random starting window; entropy when unset
    pub seed: Option<u64>,
    pub window_update: WindowUpdate,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        CompositionConfig {
            length: 21,
            sequence_length: 3,
            seed: None,
            window_update: WindowUpdate::ShiftAppend,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposerState {
    Seeding,
    Generating,
    Done,
}

/// Step-by-step composer over a borrowed model.
///
/// The model is only ever queried through `predict`, so composing never
/// changes it. The output never grows past `length` notes; a final
/// `ReplaceWindow` round that would overshoot is truncated.
pub struct Composer<'m, M: SequenceModel> {
    model: &'m M,
    config: CompositionConfig,
    rng: StdRng,
    state: ComposerState,
    window: Window,
    output: Vec<usize>,
    rounds: usize,
}

impl<'m, M: SequenceModel> Composer<'m, M> {
    pub fn new(model: &'m M, config: CompositionConfig) -> Result<Self> {
        if config.sequence_length == 0 {
            return Err(ComposerError::InvalidWindowLength);
        }
        if model.vocab_size() == 0 {
            return Err(ComposerError::VocabularyTooSmall { vocab: 0, max_note: 0 });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Composer {
            model,
            rng,
            state: ComposerState::Seeding,
            window: Vec::with_capacity(config.sequence_length),
            output: Vec::with_capacity(config.length.min(PREALLOCATED_NOTES)),
            rounds: 0,
            config,
        })
    }

    pub fn state(&self) -> ComposerState {
        self.state
    }

    pub fn window(&self) -> &[usize] {
        &self.window
    }

    /// Notes composed so far
    pub fn notes(&self) -> &[usize] {
        &self.output
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Advance one transition: seed the window, run one prediction round, or
    /// do nothing once done.
    pub fn step(&mut self) -> Result<ComposerState> {
        match self.state {
            ComposerState::Seeding => self.seed_window(),
            ComposerState::Generating => self.generate_round()?,
            ComposerState::Done => {}
        }
        Ok(self.state)
    }

    /// Step until done and return the finished composition.
    pub fn run(&mut self) -> Result<&[usize]> {
        while self.state != ComposerState::Done {
            self.step()?;
        }
        info!(notes = self.output.len(), rounds = self.rounds, "composition finished");
        Ok(&self.output)
    }

    /// Hand over the composed notes.
    pub fn into_notes(self) -> Vec<usize> {
        self.output
    }

    fn seed_window(&mut self) {
        let vocab = self.model.vocab_size();
        self.window = (0..self.config.sequence_length)
            .map(|_| self.rng.gen_range(0..vocab))
            .collect();
        debug!(window = ?self.window, "seeded starting window");

        self.state = if self.config.length == 0 {
            ComposerState::Done
        } else {
            ComposerState::Generating
        };
    }

    fn generate_round(&mut self) -> Result<()> {
        let vocab = self.model.vocab_size();
        let steps = self.config.sequence_length;
        let distribution = self.model.predict(&self.window)?;
        if distribution.dim() != (vocab, steps) {
            return Err(ComposerError::shape(format!(
                "model returned {:?}, expected ({}, {})",
                distribution.dim(),
                vocab,
                steps
            )));
        }

        let remaining = self.config.length - self.output.len();
        match self.config.window_update {
            WindowUpdate::ShiftAppend => {
                let note = argmax(distribution.column(steps - 1));
                self.output.push(note);
                self.window.remove(0);
                self.window.push(note);
            }
            WindowUpdate::ReplaceWindow => {
                let notes = argmax_notes(distribution.view());
                self.output.extend(notes.iter().take(remaining));
                self.window = notes;
            }
        }
        self.rounds += 1;
        debug!(round = self.rounds, window = ?self.window, "predicted notes");

        if self.output.len() >= self.config.length {
            self.state = ComposerState::Done;
        }
        Ok(())
    }
}

/// Compose `config.length` notes with `model` in one call.
pub fn compose<M: SequenceModel>(model: &M, config: CompositionConfig) -> Result<Vec<usize>> {
    let mut composer = Composer::new(model, config)?;
    composer.run()?;
    Ok(composer.into_notes())
}
