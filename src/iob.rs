/*!
Round trip between JSON records and two-column IOB files, and token-level evaluation of these
files.
*/
use crate::config::SeqevalConfig;
use crate::metrics::seqeval;
use crate::reporter::SeqevalScores;
use crate::{create_parent, read_json, Error, MentionMap, Result};
use flatarray::FlatArray;
use named_entity_parsing::retag;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const IOB_HEADER: &str = "# Converted to IOB format from JSON";

/// A document record as found in a gold or a prediction file. Only the fields needed to rebuild
/// the labels are read.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TextRecord {
    pub text: String,
    #[serde(default)]
    pub preds: Option<MentionMap>,
    #[serde(default)]
    pub entities: Option<MentionMap>,
}

impl TextRecord {
    /// The predicted mentions when the record has some, the gold mentions otherwise.
    pub fn mentions(&self) -> MentionMap {
        self.preds
            .as_ref()
            .or(self.entities.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// Writes the records as a two-column IOB file: the header comment, then one `token\tlabel` line
/// per token and a blank line after every record.
pub fn write_iob<W: Write>(records: &[TextRecord], mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "{}", IOB_HEADER)?;
    for record in records {
        let mentions = record.mentions();
        let (tokens, labels) = retag(&record.text, &mentions);
        for (token, label) in tokens.iter().zip(labels.iter()) {
            writeln!(writer, "{}\t{}", token, label)?;
        }
        writeln!(writer)?;
    }
    writer.flush()
}

/// Converts a JSON file of records into an IOB file. Returns the number of records written.
pub fn json_to_iob<P: AsRef<Path>, Q: AsRef<Path>>(json_path: P, iob_path: Q) -> Result<usize> {
    let records: Vec<TextRecord> = read_json(json_path.as_ref())?;
    let iob_path = iob_path.as_ref();
    create_parent(iob_path)?;
    let file = File::create(iob_path).map_err(|e| Error::io(iob_path, e))?;
    write_iob(&records, BufWriter::new(file)).map_err(|e| Error::io(iob_path, e))?;
    info!(
        records = records.len(),
        path = %iob_path.display(),
        "wrote IOB file"
    );
    Ok(records.len())
}

/// Reads the label column of an IOB file, one sequence per record. Blank lines and lines starting
/// with `#` end the current sequence. Lines that do not have exactly two tab-separated columns are
/// ignored.
pub fn parse_labels(content: &str) -> Vec<Vec<String>> {
    let mut sequences = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            if !current.is_empty() {
                sequences.push(std::mem::take(&mut current));
            }
            continue;
        }
        let columns: Vec<&str> = line.trim().split('\t').collect();
        if let [_, label] = columns.as_slice() {
            current.push(label.to_string());
        }
    }
    if !current.is_empty() {
        sequences.push(current);
    }
    sequences
}

/// Reads the label sequences of an IOB file.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<FlatArray<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(FlatArray::new(parse_labels(&content)))
}

/// Computes the token-level scores of a predicted IOB file against a reference IOB file.
pub fn evaluate_iob_files<P: AsRef<Path>, Q: AsRef<Path>>(
    pred_iob: P,
    gold_iob: Q,
    config: &SeqevalConfig,
) -> Result<SeqevalScores> {
    let predictions = load_labels(pred_iob)?;
    let references = load_labels(gold_iob)?;
    info!(
        references = references.n_arrays(),
        predictions = predictions.n_arrays(),
        "loaded label sequences"
    );
    Ok(seqeval(&references, &predictions, config)?)
}

/// Writes the scores as a two-line tab-separated table.
pub fn write_scores_tsv<P: AsRef<Path>>(scores: &SeqevalScores, path: P) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    scores
        .write_tsv(BufWriter::new(file))
        .map_err(|e| Error::io(path, e))
}
