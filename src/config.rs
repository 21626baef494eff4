//! Run configuration: where the notes live, how the network is shaped, how
//! long it trains and what it composes. Every section falls back to its
//! defaults, so a JSON file only has to name what it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::composer::CompositionConfig;
use crate::error::{ComposerError, Result};
use crate::models::note_network::NetworkConfig;
use crate::training::TrainingConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Training notes, one per row under a header
    pub input_path: PathBuf,
    /// Where the composition is written
    pub output_path: PathBuf,
    /// Save the trained model here when set
    pub model_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            input_path: PathBuf::from("training.csv"),
            output_path: PathBuf::from("sonata.csv"),
            model_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub data: DataConfig,
    pub network: NetworkConfig,
    pub training: TrainingConfig,
    pub composition: CompositionConfig,
}

impl ComposerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ComposerError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| ComposerError::invalid_config(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.composition.sequence_length == 0 {
            return Err(ComposerError::InvalidWindowLength);
        }
        if !(0.0..1.0).contains(&self.network.dropout) {
            return Err(ComposerError::invalid_config(format!(
                "dropout {} is outside [0, 1)",
                self.network.dropout
            )));
        }
        if self.network.lstm_hidden_sizes.is_empty() {
            return Err(ComposerError::invalid_config("network needs at least one LSTM layer"));
        }
        if self.network.projection_size == 0
            || self.network.dense_size == 0
            || self.network.lstm_hidden_sizes.contains(&0)
        {
            return Err(ComposerError::invalid_config("layer sizes must be positive"));
        }
        if let Some(clip) = self.network.clip_gradient {
            if clip <= 0.0 {
                return Err(ComposerError::invalid_config("clip_gradient must be positive"));
            }
        }
        self.training.validate()
    }
}
