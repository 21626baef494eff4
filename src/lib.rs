//! # Note Composer
//!
//! Train a stacked LSTM on a sequence of integer note codes and compose new
//! sequences by feeding its own predictions back in.
//!
//! ## Pipeline
//!
//! - **Dataset**: load a one-column CSV of note codes and write compositions back out
//! - **Windowing**: sliding input windows and one-hot next-note targets
//! - **Network**: one-hot → projection → stacked LSTM → dense → dropout → softmax
//! - **Training**: fixed number of cycles with a long-lived Adam or SGD optimizer
//! - **Composer**: random seed window, then argmax feedback until enough notes exist
//! - **Persistence**: JSON or bincode snapshots with training metadata
//!
//! ## Quick Start
//!
//! ```rust
//! use note_composer::{compose, CompositionConfig, CycleTrainer, NetworkConfig, NoteNetwork};
//! use note_composer::{NoteSequence, TrainingConfig, TrainingSet, Adam};
//!
//! let sequence = NoteSequence::from_notes((0..24).map(|i| i % 4).collect());
//! let set = TrainingSet::from_sequence(&sequence, 3, sequence.vocab_size()).unwrap();
//!
//! let network_config = NetworkConfig {
//!     lstm_hidden_sizes: vec![8],
//!     seed: Some(1),
//!     ..NetworkConfig::default()
//! };
//! let network = NoteNetwork::new(set.vocab_size, &network_config).unwrap();
//!
//! let training = TrainingConfig { cycles: 2, ..TrainingConfig::default() };
//! let mut trainer = CycleTrainer::new(network, Adam::new(training.step_size), training);
//! trainer.run(&set).unwrap();
//!
//! let composition = CompositionConfig {
//!     length: 10,
//!     seed: Some(7),
//!     ..CompositionConfig::default()
//! };
//! let notes = compose(trainer.model(), composition).unwrap();
//! assert_eq!(notes.len(), 10);
//! ```

pub mod composer;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod training;
pub mod utils;
pub mod windowing;

// Re-export commonly used items
pub use composer::{compose, Composer, ComposerState, CompositionConfig, WindowUpdate};
pub use config::{ComposerConfig, DataConfig};
pub use dataset::{load_notes_csv, write_notes_csv, NoteSequence};
pub use error::{ComposerError, Result};
pub use loss::{CrossEntropyLoss, LossKind, MSELoss};
pub use metrics::accuracy;
pub use model::SequenceModel;
pub use models::note_network::{NetworkConfig, NoteNetwork};
pub use optimizers::{build_optimizer, Adam, Optimizer, OptimizerKind, SGD};
pub use persistence::{load_model, save_model, ModelMetadata, ModelPersistence};
pub use training::{CycleMetrics, CycleTrainer, TrainingConfig};
pub use windowing::{
    build_input_windows, build_target_distributions, build_target_labels, TrainingSet, Window,
};
