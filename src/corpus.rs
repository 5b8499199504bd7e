/*!
Conversion of a HIPE-style column corpus into document records.

The corpus is tab-separated: the first column is the token, the second its BIO label, and lines
with ten columns carry a `MISC` column whose `NoSpaceAfter` flag glues the token to the next one.
Documents start with a `# <namespace>:document_id = <id>` comment.
*/
use crate::{Error, MentionMap, Result};
use named_entity_parsing::extract_mentions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const DOCUMENT_ID_MARKER: &str = ":document_id = ";
const MISC_COLUMNS: usize = 10;
const NO_SPACE_AFTER: &str = "NoSpaceAfter";

/// A token of the corpus, with its label and whether a space follows it in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusToken {
    pub token: String,
    pub label: String,
    pub space_after: bool,
}

/// A document of the corpus: its text, rebuilt from the tokens, and the gold mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub text: String,
    pub entities: MentionMap,
}

impl DocumentRecord {
    /// Builds the record of a document from its tokens.
    pub fn from_tokens<S: Into<String>>(document_id: S, tokens: &[CorpusToken]) -> Self {
        let text: String = tokens
            .iter()
            .flat_map(|t| {
                let space = if t.space_after { " " } else { "" };
                [t.token.as_str(), space]
            })
            .collect();
        let surfaces: Vec<&str> = tokens.iter().map(|t| t.token.as_str()).collect();
        let labels: Vec<&str> = tokens.iter().map(|t| t.label.as_str()).collect();
        Self {
            document_id: document_id.into(),
            text: text.trim().to_string(),
            entities: extract_mentions(&surfaces, &labels),
        }
    }
}

/// What a single line of the corpus holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusLine<'a> {
    DocumentStart(&'a str),
    Token(CorpusToken),
    Skip,
}

impl<'a> CorpusLine<'a> {
    /// Classifies a line. Surrounding whitespace is ignored.
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.starts_with('#') {
            if line.contains(DOCUMENT_ID_MARKER) {
                let id = line.rsplit("= ").next().unwrap_or_default();
                return Self::DocumentStart(id);
            }
            return Self::Skip;
        }
        if line.is_empty() {
            return Self::Skip;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 2 {
            debug!(line, "skipping a line with less than 2 columns");
            return Self::Skip;
        }
        let space_after = columns.len() != MISC_COLUMNS
            || !columns[MISC_COLUMNS - 1].contains(NO_SPACE_AFTER);
        Self::Token(CorpusToken {
            token: columns[0].to_string(),
            label: columns[1].to_string(),
            space_after,
        })
    }
}

/// Groups the lines of a corpus into documents. Token lines found before the first document
/// marker do not belong to any document and are dropped.
pub fn normalize_corpus<I, S>(lines: I) -> Vec<DocumentRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut documents = Vec::new();
    let mut current: Option<(String, Vec<CorpusToken>)> = None;
    for line in lines {
        match CorpusLine::parse(line.as_ref()) {
            CorpusLine::DocumentStart(id) => {
                if let Some((previous, tokens)) = current.take() {
                    documents.push(DocumentRecord::from_tokens(previous, &tokens));
                }
                current = Some((id.to_string(), Vec::new()));
            }
            CorpusLine::Token(token) => match current.as_mut() {
                Some((_, tokens)) => tokens.push(token),
                None => debug!(token = %token.token, "skipping a token outside any document"),
            },
            CorpusLine::Skip => {}
        }
    }
    if let Some((id, tokens)) = current {
        documents.push(DocumentRecord::from_tokens(id, &tokens));
    }
    documents
}

/// Reads and normalizes a corpus file.
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<DocumentRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let documents = normalize_corpus(content.lines());
    info!(
        path = %path.display(),
        documents = documents.len(),
        mentions = documents.iter().map(|d| d.entities.mention_count()).sum::<usize>(),
        "normalized corpus"
    );
    Ok(documents)
}
