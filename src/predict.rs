/*!
Entity predictions with a chat-completion model.

A [`Predictor`] turns the text of a document into mentions grouped by type. The model is asked to
answer with a JSON object; an answer that cannot be read as such is replaced by an empty mapping,
so one bad answer never stops a batch.
*/
use crate::config::RunConfig;
use crate::corpus::DocumentRecord;
use crate::{write_json_indented, MentionMap};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Failure to obtain an answer from the model.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid API key header: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("model endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("model answer has no content")]
    EmptyResponse,
}

/// Something able to list the mentions of a text.
pub trait Predictor {
    fn predict(&self, text: &str) -> Result<MentionMap, PredictError>;
}

/// A prediction for one document, as written to the prediction file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub text: String,
    pub preds: MentionMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds the instruction sent to the model for `text`, restricted to the types of `labels`.
pub fn build_prompt<S: AsRef<str>>(text: &str, labels: &[S]) -> String {
    let categories = labels
        .iter()
        .map(|l| format!("\"{}\"", l.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    let output_format = labels
        .iter()
        .map(|l| format!("\"{}\": [...]", l.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "This is a named entity recognition task, which consists of two steps:
1) First, identify all entity mentions in the text.
2) Then classify each mention into one of the following categories:
[{categories}].

Given the following text:
{text}

Output format: {{{output_format}}}
Do not provide any explanation.
"
    )
}

/// Reads the answer of the model. Anything else than a JSON object mapping types to lists of
/// strings yields an empty list for every label.
pub fn parse_prediction<S: AsRef<str>>(raw: &str, labels: &[S]) -> MentionMap {
    match serde_json::from_str::<MentionMap>(raw.trim()) {
        Ok(mentions) => mentions,
        Err(e) => {
            warn!(error = %e, raw, "could not parse the model answer");
            MentionMap::with_types(labels.iter().map(|l| l.as_ref()))
        }
    }
}

/// Client of an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionPredictor {
    client: HttpClient,
    model: String,
    api_key: String,
    base_url: String,
    labels: Vec<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Deserialize)]
struct ChatAnswer {
    content: Option<String>,
}

impl ChatCompletionPredictor {
    pub fn new(config: &RunConfig) -> Result<Self, PredictError> {
        let client = HttpClient::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            labels: config.labels.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `prompt` as the user message and returns the content of the first choice.
    pub fn complete(&self, prompt: &str) -> Result<String, PredictError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&request)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PredictError::Status { status, body });
        }
        let body: ChatResponse = response.json()?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(PredictError::EmptyResponse)
    }
}

impl Predictor for ChatCompletionPredictor {
    fn predict(&self, text: &str) -> Result<MentionMap, PredictError> {
        let answer = self.complete(&build_prompt(text, &self.labels))?;
        debug!(answer = %answer, "model output");
        Ok(parse_prediction(&answer, &self.labels))
    }
}

/// Answers every text with the same raw response.
#[derive(Debug, Clone)]
pub struct FixedPredictor {
    response: String,
    labels: Vec<String>,
}

impl FixedPredictor {
    pub fn new<S: Into<String>>(response: S, labels: Vec<String>) -> Self {
        Self {
            response: response.into(),
            labels,
        }
    }
}

impl Predictor for FixedPredictor {
    fn predict(&self, _text: &str) -> Result<MentionMap, PredictError> {
        Ok(parse_prediction(&self.response, &self.labels))
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Predicts the mentions of every document, in order. A failed call is recorded in the `error`
/// field of its record, with an empty list for every label, and the batch goes on.
pub fn predict_documents<P: Predictor + ?Sized, S: AsRef<str>>(
    predictor: &P,
    documents: &[DocumentRecord],
    labels: &[S],
) -> Vec<PredictionRecord> {
    let pb = progress_bar(documents.len());
    let mut records = Vec::with_capacity(documents.len());
    let mut failures = 0usize;
    for document in documents {
        let start = Instant::now();
        let (preds, error) = match predictor.predict(&document.text) {
            Ok(preds) => (preds, None),
            Err(e) => {
                let message = format!("Model error: {}", e);
                error!(document_id = %document.document_id, "{}", message);
                failures += 1;
                (
                    MentionMap::with_types(labels.iter().map(|l| l.as_ref())),
                    Some(message),
                )
            }
        };
        debug!(
            document_id = %document.document_id,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "processed document"
        );
        records.push(PredictionRecord {
            document_id: Some(document.document_id.clone()),
            text: document.text.clone(),
            preds,
            error,
        });
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!(
        documents = records.len(),
        failures, "predicted mentions"
    );
    records
}

/// Indentation of the prediction files.
const PREDICTION_INDENT: usize = 4;

/// Writes the prediction records as a JSON array indented with 4 spaces.
pub fn write_predictions<P: AsRef<Path>>(
    records: &[PredictionRecord],
    path: P,
) -> crate::Result<()> {
    write_json_indented(records, path, PREDICTION_INDENT)
}
