use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::error::{ComposerError, Result};
use crate::layers::linear::LinearLayer;
use crate::layers::lstm::LstmLayer;
use crate::loss::LossKind;
use crate::models::note_network::NoteNetwork;

/// Row-major copy of an `Array2<f64>` with its shape
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl SerializableArray2 {
    fn into_array(self) -> Result<Array2<f64>> {
        let shape = self.shape;
        Array2::from_shape_vec(shape, self.data)
            .map_err(|e| ComposerError::Persistence {
                reason: format!("stored {:?} array is malformed: {}", shape, e),
            })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SerializableLinear {
    weight: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LinearLayer> for SerializableLinear {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl SerializableLinear {
    fn into_layer(self, name: &str) -> Result<LinearLayer> {
        let weight = self.weight.into_array()?;
        let bias = self.bias.into_array()?;
        LinearLayer::from_weights(weight, bias).ok_or_else(|| {
            ComposerError::shape(format!("stored {} layer has inconsistent shapes", name))
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SerializableLstm {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LstmLayer> for SerializableLstm {
    fn from(layer: &LstmLayer) -> Self {
        Self {
            w_ih: (&layer.w_ih).into(),
            w_hh: (&layer.w_hh).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl SerializableLstm {
    fn into_layer(self, index: usize) -> Result<LstmLayer> {
        LstmLayer::from_weights(
            self.w_ih.into_array()?,
            self.w_hh.into_array()?,
            self.bias.into_array()?,
        )
        .ok_or_else(|| {
            ComposerError::shape(format!("stored LSTM layer {} has inconsistent shapes", index))
        })
    }
}

/// Weights and settings of a [`NoteNetwork`] in storable form
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableNoteNetwork {
    projection: SerializableLinear,
    lstm_layers: Vec<SerializableLstm>,
    hidden: SerializableLinear,
    output: SerializableLinear,
    dropout: f64,
    clip_gradient: Option<f64>,
    loss: LossKind,
}

impl From<&NoteNetwork> for SerializableNoteNetwork {
    fn from(network: &NoteNetwork) -> Self {
        Self {
            projection: (&network.projection).into(),
            lstm_layers: network.lstm_layers.iter().map(SerializableLstm::from).collect(),
            hidden: (&network.hidden).into(),
            output: (&network.output).into(),
            dropout: network.dropout.dropout_rate,
            clip_gradient: network.clip_gradient,
            loss: network.loss,
        }
    }
}

impl SerializableNoteNetwork {
    /// Rebuild the network, rejecting layers that do not chain together
    pub fn into_network(self) -> Result<NoteNetwork> {
        let lstm_layers = self
            .lstm_layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| layer.into_layer(i))
            .collect::<Result<Vec<_>>>()?;

        NoteNetwork::from_parts(
            self.projection.into_layer("projection")?,
            lstm_layers,
            self.hidden.into_layer("hidden")?,
            self.output.into_layer("output")?,
            self.dropout,
            self.clip_gradient,
            self.loss,
        )
    }
}

/// What the model was trained on and how well it did
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub vocab_size: usize,
    /// Window length the model was trained with
    pub sequence_length: usize,
    pub projection_size: usize,
    pub lstm_hidden_sizes: Vec<usize>,
    pub dense_size: usize,
    pub cycles_trained: usize,
    pub final_accuracy: Option<f64>,
    pub description: Option<String>,
}

impl ModelMetadata {
    /// Metadata for `network`, stamped with the crate version and the current time
    pub fn for_network(
        network: &NoteNetwork,
        model_name: impl Into<String>,
        sequence_length: usize,
        cycles_trained: usize,
        final_accuracy: Option<f64>,
    ) -> Self {
        ModelMetadata {
            model_name: model_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            vocab_size: network.vocab_size,
            sequence_length,
            projection_size: network.projection_size(),
            lstm_hidden_sizes: network.lstm_hidden_sizes(),
            dense_size: network.dense_size(),
            cycles_trained,
            final_accuracy,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Network plus metadata, the unit written to disk
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub network: SerializableNoteNetwork,
    pub metadata: ModelMetadata,
}

/// Raw JSON and bincode encoding of [`SavedModel`]
pub struct ModelPersistence;

impl ModelPersistence {
    /// Human-readable format
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Compact format
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

/// Save `network` with `metadata`. `.json` paths get JSON, everything else bincode.
pub fn save_model<P: AsRef<Path>>(
    network: &NoteNetwork,
    metadata: ModelMetadata,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    if metadata.vocab_size != network.vocab_size {
        return Err(ComposerError::shape(format!(
            "metadata vocabulary {} does not match network vocabulary {}",
            metadata.vocab_size, network.vocab_size
        )));
    }

    let saved = SavedModel {
        network: network.into(),
        metadata,
    };
    if is_json(path) {
        ModelPersistence::save_to_json(&saved, path)?;
    } else {
        ModelPersistence::save_to_binary(&saved, path)?;
    }
    info!(path = %path.display(), "saved model");
    Ok(())
}

/// Load a network saved by [`save_model`], choosing the format by extension
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<(NoteNetwork, ModelMetadata)> {
    let path = path.as_ref();
    let saved = if is_json(path) {
        ModelPersistence::load_from_json(path)?
    } else {
        ModelPersistence::load_from_binary(path)?
    };

    let network = saved.network.into_network()?;
    if network.vocab_size != saved.metadata.vocab_size {
        return Err(ComposerError::Persistence {
            reason: format!(
                "stored network has vocabulary {}, metadata says {}",
                network.vocab_size, saved.metadata.vocab_size
            ),
        });
    }
    info!(path = %path.display(), model = %saved.metadata.model_name, "loaded model");
    Ok((network, saved.metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SequenceModel;
    use crate::models::note_network::NetworkConfig;
    use tempfile::tempdir;

    fn network() -> NoteNetwork {
        let config = NetworkConfig {
            projection_size: 3,
            lstm_hidden_sizes: vec![4],
            dense_size: 5,
            seed: Some(11),
            ..NetworkConfig::default()
        };
        NoteNetwork::new(6, &config).unwrap()
    }

    #[test]
    fn test_array_round_trip_keeps_layout() {
        let array = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let restored = SerializableArray2::from(&array).into_array().unwrap();
        assert_eq!(restored, array);
    }

    #[test]
    fn test_malformed_array_is_an_error() {
        let bad = SerializableArray2 {
            data: vec![1.0, 2.0, 3.0],
            shape: (2, 2),
        };
        assert!(matches!(bad.into_array(), Err(ComposerError::Persistence { .. })));
    }

    #[test]
    fn test_metadata_describes_network() {
        let network = network();
        let metadata = ModelMetadata::for_network(&network, "test", 3, 20, Some(50.0))
            .with_description("unit");

        assert_eq!(metadata.vocab_size, 6);
        assert_eq!(metadata.projection_size, 3);
        assert_eq!(metadata.lstm_hidden_sizes, vec![4]);
        assert_eq!(metadata.dense_size, 5);
        assert_eq!(metadata.version, env!("CARGO_PKG_VERSION"));
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.created_at).is_ok());
        assert_eq!(metadata.description.as_deref(), Some("unit"));
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempdir().unwrap();
        let network = network();
        let expected = network.predict(&[0, 5, 2]).unwrap();

        for name in ["model.json", "model.bin"] {
            let path = dir.path().join(name);
            let metadata = ModelMetadata::for_network(&network, name, 3, 1, None);
            save_model(&network, metadata.clone(), &path).unwrap();

            let (loaded, loaded_metadata) = load_model(&path).unwrap();
            assert_eq!(loaded_metadata, metadata);
            assert_eq!(loaded.predict(&[0, 5, 2]).unwrap(), expected);
        }
    }

    #[test]
    fn test_rejects_mismatched_metadata() {
        let dir = tempdir().unwrap();
        let network = network();
        let mut metadata = ModelMetadata::for_network(&network, "bad", 3, 1, None);
        metadata.vocab_size = 7;
        assert!(save_model(&network, metadata, dir.path().join("bad.json")).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_model(dir.path().join("missing.bin")),
            Err(ComposerError::Io { .. })
        ));
    }
}
