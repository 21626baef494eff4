//! `note-composer`: train on a note CSV, then compose a new sequence.
//!
//! ```text
//! USAGE:
//!   note-composer [--config run.json] [--input training.csv] [--output sonata.csv]
//!                 [--save-model model.bin] [--cycles N] [--length M] [--seed S]
//!                 [--replace-window]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use note_composer::{
    build_optimizer, compose, load_notes_csv, save_model, write_notes_csv, ComposerConfig,
    CycleTrainer, ModelMetadata, NoteNetwork, TrainingSet, WindowUpdate,
};

#[derive(Parser, Debug)]
#[command(
    name = "note-composer",
    about = "Train an LSTM on note sequences and compose new ones",
    version
)]
struct Cli {
    /// JSON run configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Training CSV with one note code per row
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Where to write the composed notes
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the trained model (.json for JSON, anything else for bincode)
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// Number of training cycles
    #[arg(long)]
    cycles: Option<usize>,

    /// Number of notes to compose
    #[arg(short, long)]
    length: Option<usize>,

    /// Seed for weight init, dropout and the starting window
    #[arg(short, long)]
    seed: Option<u64>,

    /// Feed back every predicted step instead of only the last one
    #[arg(long)]
    replace_window: bool,
}

impl Cli {
    fn into_config(self) -> Result<ComposerConfig> {
        let mut config = match &self.config {
            Some(path) => ComposerConfig::from_json_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => ComposerConfig::default(),
        };

        if let Some(input) = self.input {
            config.data.input_path = input;
        }
        if let Some(output) = self.output {
            config.data.output_path = output;
        }
        if self.save_model.is_some() {
            config.data.model_path = self.save_model;
        }
        if let Some(cycles) = self.cycles {
            config.training.cycles = cycles;
        }
        if let Some(length) = self.length {
            config.composition.length = length;
        }
        if let Some(seed) = self.seed {
            config.network.seed = Some(seed);
            config.composition.seed = Some(seed);
        }
        if self.replace_window {
            config.composition.window_update = WindowUpdate::ReplaceWindow;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Cli::parse().into_config()?;
    let data = &config.data;

    info!("loading notes");
    let sequence = load_notes_csv(&data.input_path)
        .with_context(|| format!("failed to load {}", data.input_path.display()))?;
    let vocab_size = sequence.vocab_size();
    info!(notes = sequence.len(), vocab_size, "notes loaded");

    let sequence_length = config.composition.sequence_length;
    let set = TrainingSet::from_sequence(&sequence, sequence_length, vocab_size)
        .context("failed to build training windows")?;

    info!("training");
    let network = NoteNetwork::new(vocab_size, &config.network).context("failed to build network")?;
    let optimizer = build_optimizer(config.training.optimizer, config.training.step_size);
    let mut trainer = CycleTrainer::new(network, optimizer, config.training.clone());
    trainer.run(&set).context("training failed")?;
    let final_accuracy = trainer.latest_metrics().and_then(|m| m.accuracy);
    let network = trainer.into_model();

    info!("composing");
    let notes = compose(&network, config.composition.clone()).context("composition failed")?;
    write_notes_csv(&data.output_path, &notes)
        .with_context(|| format!("failed to write {}", data.output_path.display()))?;
    info!(notes = notes.len(), path = %data.output_path.display(), "composition written");

    if let Some(model_path) = &data.model_path {
        let metadata = ModelMetadata::for_network(
            &network,
            "note-composer",
            sequence_length,
            config.training.cycles,
            final_accuracy,
        )
        .with_description(format!("trained on {}", data.input_path.display()));
        save_model(&network, metadata, model_path)
            .with_context(|| format!("failed to save model to {}", model_path.display()))?;
    }

    info!("finished");
    Ok(())
}
