//! Reading note sequences from CSV and writing compositions back out.
//!
//! The note file has a header row followed by one note code per row in the
//! first column. Codes may be written as integers or as integral floats
//! (`60.0`), which is how most numeric tools save a single-column matrix.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ComposerError, Result};

/// Header written above generated notes.
pub const NOTE_COLUMN: &str = "note";

/// Largest note code the loader accepts. The vocabulary is `max + 1` wide,
/// and every one-hot input and output layer is sized by it.
pub const MAX_NOTE: usize = 4095;

/// Ordered, immutable sequence of integer note codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteSequence {
    notes: Vec<usize>,
}

impl NoteSequence {
    pub fn from_notes(notes: Vec<usize>) -> Self {
        Self { notes }
    }

    pub fn notes(&self) -> &[usize] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn max_note(&self) -> Option<usize> {
        self.notes.iter().copied().max()
    }

    /// Smallest vocabulary that holds every note in the sequence.
    ///
    /// Saturates at `usize::MAX`, which no vocabulary check will accept.
    pub fn vocab_size(&self) -> usize {
        self.max_note().map_or(0, |max| max.saturating_add(1))
    }
}

/// Load a note sequence from a CSV file with a header row.
pub fn load_notes_csv<P: AsRef<Path>>(path: P) -> Result<NoteSequence> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ComposerError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let sequence = read_notes(BufReader::new(file))?;
    info!(
        path = %path.display(),
        notes = sequence.len(),
        vocab_size = sequence.vocab_size(),
        "loaded note sequence"
    );
    Ok(sequence)
}

/// Parse notes from any buffered reader; the first line is the header.
pub fn read_notes<R: BufRead>(reader: R) -> Result<NoteSequence> {
    let mut lines = reader.lines();

    let header = lines.next().ok_or(ComposerError::EmptyDataset)??;
    debug!(header = header.trim(), "skipping header row");

    let mut notes = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Header is line 1.
        let line_no = idx + 2;
        let field = trimmed.split(',').next().unwrap_or("").trim();
        notes.push(parse_note(field, line_no)?);
    }

    if notes.is_empty() {
        return Err(ComposerError::EmptyDataset);
    }
    Ok(NoteSequence::from_notes(notes))
}

fn parse_note(field: &str, line: usize) -> Result<usize> {
    if let Ok(note) = field.parse::<usize>() {
        return check_range(note, line);
    }

    let value: f64 = field
        .parse()
        .map_err(|_| ComposerError::parse(line, format!("'{}' is not a number", field)))?;
    if !value.is_finite() {
        return Err(ComposerError::parse(line, format!("'{}' is not finite", field)));
    }
    if value < 0.0 {
        return Err(ComposerError::parse(line, format!("note {} is negative", value)));
    }
    if value.fract() != 0.0 {
        return Err(ComposerError::parse(line, format!("note {} is not an integer", value)));
    }
    if value > MAX_NOTE as f64 {
        return Err(ComposerError::parse(
            line,
            format!("note {} exceeds the largest code {}", value, MAX_NOTE),
        ));
    }
    Ok(value as usize)
}

fn check_range(note: usize, line: usize) -> Result<usize> {
    if note > MAX_NOTE {
        return Err(ComposerError::parse(
            line,
            format!("note {} exceeds the largest code {}", note, MAX_NOTE),
        ));
    }
    Ok(note)
}

/// Write a composition as a single-column CSV with a `note` header.
pub fn write_notes_csv<P: AsRef<Path>>(path: P, notes: &[usize]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_notes(&mut writer, notes)?;
    writer.flush()?;
    info!(path = %path.display(), notes = notes.len(), "saved composition");
    Ok(())
}

/// Write notes to any writer, one per row after the header.
pub fn write_notes<W: Write>(writer: &mut W, notes: &[usize]) -> Result<()> {
    writeln!(writer, "{}", NOTE_COLUMN)?;
    for note in notes {
        writeln!(writer, "{}", note)?;
    }
    Ok(())
}
