/*!
Evaluation toolkit for LLM-based named entity recognition on historical newspapers.

The crate covers the whole pipeline:
* `corpus`: converts a HIPE-style column corpus into one JSON record per document, with the text
    and the gold mentions of every entity type.
* `predict`: asks a chat-completion model to list the mentions of a closed set of entity types.
* `scoring`: set-based precision, recall and f1 per type, with micro and macro averages, comparing
    the mention strings of each document.
* `iob` and `metrics`: writes the records back as BIO labels and scores them at the token level,
    the way SeqEval does.

# Terminology
* A type (or class) is an entity we are interested in, such as 'LOC' for location, 'STREET' or
    'BUILDING'. It can be anything, but must be represented by a string.
* A label is a string made of a prefix and a type, such as `B-LOC`. The prefix indicates where we
    are in the current chunk: `B` begins it, `I` continues it and `O` is outside any chunk.
* A mention is the surface string of an entity, its tokens joined by single spaces.
* A chunk is a list of at least one label associated with a named entity, such as `["B-LOC",
    "I-LOC"]`.
*/

pub mod config;
pub mod corpus;
pub mod iob;
mod metrics;
pub mod predict;
mod reporter;
pub mod scoring;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use config::{RunConfig, RunConfigBuilder, SeqevalConfig, SeqevalConfigBuilder};
pub use metrics::{
    accuracy_score, classification_report, precision_recall_fscore_support, seqeval,
    ComputationError, DivByZeroStrat, DivisionByZeroError, InconsistentLengthError,
    PrecisionRecallFScoreTrueSum,
};
pub use named_entity_parsing::{extract_mentions, retag, MentionMap};
pub use reporter::{Average, ClassMetrics, OverallAverage, Reporter, SeqevalScores, TypeMetrics};

/// Failures that stop a stage: unreadable inputs, unwritable outputs and label sequences that
/// cannot be scored.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token-level evaluation failed: {0}")]
    Computation(#[from] ComputationError<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Creates the parent directories of `path`, if any.
pub(crate) fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Reads a JSON document from a file.
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::json(path, e))
}

/// Writes `value` as pretty-printed JSON (two-space indentation, non-ASCII characters kept as
/// is), creating the parent directories.
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    write_json_indented(value, path, 2)
}

/// Same as [`write_json`], with `indent` spaces per level.
pub fn write_json_indented<T: Serialize + ?Sized, P: AsRef<Path>>(
    value: &T,
    path: P,
    indent: usize,
) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let indent = vec![b' '; indent];
    let formatter = PrettyFormatter::with_indent(&indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::json(path, e))?;
    writer.flush().map_err(|e| Error::io(path, e))
}
