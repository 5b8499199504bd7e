/*
 * This modules contains the two configuration structures of the crate. `SeqevalConfig` simplifies
 * the arguments of the token-level metrics, and `RunConfig` gathers everything the command line
 * stages need: model endpoint, label set and output locations. Both are built with a builder and
 * implement the default trait.
*/
use crate::metrics::DivByZeroStrat;
use either::Either as LeftOrRight;
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the whole output directory.
pub const OUTPUT_DIR_ENV: &str = "NEREVAL_OUTPUT_DIR";
/// Environment variable naming the subdirectory of the base output directory.
pub const USER_ENV: &str = "NEREVAL_USER";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-32B-Instruct";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
pub const DEFAULT_API_KEY: &str = "EMPTY";
pub const DEFAULT_LABELS: [&str; 3] = ["LOC", "STREET", "BUILDING"];
const DEFAULT_OUTPUT_BASE: &str = "output";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
/// Config struct used to simplify the inputs of the token-level metrics. It implements the default
/// trait.
pub struct SeqevalConfig {
    /// This parameter describe what to do when we encounter a division by zero when computing
    /// precision and recall. The most common solution is to replace the results by 0.
    pub(crate) zero_division: DivByZeroStrat,
    /// If the prefix (e.g. 'I', 'B', 'O') is located at the end of the labels, this parameter
    /// should be `true`.
    pub(crate) suffix: bool,
    /// Character separating the prefix from the entity type.
    pub(crate) delimiter: char,
    /// Can we use multiple cores to compute the metrics? In practice, the sequential version is
    /// faster on small corpora.
    pub(crate) parallel: bool,
}

impl Default for SeqevalConfig {
    fn default() -> Self {
        Self {
            zero_division: DivByZeroStrat::ReplaceBy0,
            suffix: false,
            delimiter: '-',
            parallel: false,
        }
    }
}

impl Display for SeqevalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Strategy when encountering a division by zero: {:?}\n Prefix located at the end of the labels: {}\n Delimiter: {:?}\n Using parallel computations: {}",
            self.zero_division, self.suffix, self.delimiter, self.parallel
        )
    }
}

/// This builder can be used to build and customize a `SeqevalConfig` structure.
#[derive(Debug, Clone)]
pub struct SeqevalConfigBuilder {
    zero_division: DivByZeroStrat,
    suffix: bool,
    delimiter: char,
    parallel: bool,
}

impl Default for SeqevalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SeqevalConfigBuilder {
    pub fn new() -> Self {
        let defaults = SeqevalConfig::default();
        Self {
            zero_division: defaults.zero_division,
            suffix: defaults.suffix,
            delimiter: defaults.delimiter,
            parallel: defaults.parallel,
        }
    }
    pub fn division_by_zero<Z: Into<DivByZeroStrat>>(mut self, division_by_zero: Z) -> Self {
        self.zero_division = division_by_zero.into();
        self
    }
    pub fn suffix(mut self, suffix: bool) -> Self {
        self.suffix = suffix;
        self
    }
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn build(self) -> SeqevalConfig {
        SeqevalConfig {
            zero_division: self.zero_division,
            suffix: self.suffix,
            delimiter: self.delimiter,
            parallel: self.parallel,
        }
    }
}

/// Settings shared by the stages of a run.
///
/// The output directory is either given explicitly (`Left`) or derived (`Right`) from a base
/// directory and a user name, so several people can share the same base directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub labels: Vec<String>,
    output_dir: LeftOrRight<PathBuf, (PathBuf, String)>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfigBuilder::default().build()
    }
}

impl RunConfig {
    /// Directory holding every file written by a run. It is not created by this method.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            LeftOrRight::Left(dir) => dir.clone(),
            LeftOrRight::Right((base, user)) => base.join(user),
        }
    }

    /// Model name as a relative path. Names such as `Qwen/Qwen2.5-32B-Instruct` yield a
    /// subdirectory.
    fn model_file(&self, suffix: &str) -> PathBuf {
        self.output_dir().join(format!("{}{}", self.model, suffix))
    }

    /// `<output_dir>/<model>_ner.json`
    pub fn prediction_path(&self) -> PathBuf {
        self.model_file("_ner.json")
    }

    /// `<output_dir>/<model>_ner_f1_result.json`
    pub fn score_path(&self) -> PathBuf {
        self.model_file("_ner_f1_result.json")
    }

    /// `<output_dir>/<model>_ner_eval_iob_results.tsv`
    pub fn iob_score_path(&self) -> PathBuf {
        self.model_file("_ner_eval_iob_results.tsv")
    }

    pub fn gold_iob_path(&self) -> PathBuf {
        self.output_dir().join("gt_iob.tsv")
    }

    pub fn pred_iob_path(&self) -> PathBuf {
        self.output_dir().join("pred_iob.tsv")
    }
}

impl Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Model: {}\n Endpoint: {}\n Timeout: {:?}\n Labels: {}\n Output directory: {}",
            self.model,
            self.base_url,
            self.timeout,
            self.labels.join(", "),
            self.output_dir().display()
        )
    }
}

/// Name of the per-user output subdirectory: the first non-empty value among `NEREVAL_USER`,
/// `USER`, then `default`.
fn resolve_user(nereval_user: Option<String>, user: Option<String>) -> String {
    nereval_user
        .into_iter()
        .chain(user)
        .find(|u| !u.trim().is_empty())
        .unwrap_or_else(|| String::from("default"))
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// This builder can be used to build and customize a `RunConfig` structure. Values that are not
/// set fall back to the environment, then to the defaults.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    labels: Option<Vec<String>>,
    output_dir: Option<PathBuf>,
    output_base: Option<PathBuf>,
    user: Option<String>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }
    /// Uses exactly this directory for the outputs.
    pub fn output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = Some(output_dir.as_ref().to_path_buf());
        self
    }
    /// Base directory under which the per-user directory is created.
    pub fn output_base<P: AsRef<Path>>(mut self, output_base: P) -> Self {
        self.output_base = Some(output_base.as_ref().to_path_buf());
        self
    }
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }
    pub fn build(self) -> RunConfig {
        let output_dir = match self
            .output_dir
            .or_else(|| non_empty_var(OUTPUT_DIR_ENV).map(PathBuf::from))
        {
            Some(dir) => LeftOrRight::Left(dir),
            None => {
                let base = self
                    .output_base
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_BASE));
                let user = match self.user {
                    Some(user) => user,
                    None => resolve_user(non_empty_var(USER_ENV), non_empty_var("USER")),
                };
                LeftOrRight::Right((base, user))
            }
        };
        let labels = self
            .labels
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LABELS.iter().map(|l| l.to_string()).collect());
        RunConfig {
            model: self.model.unwrap_or_else(|| String::from(DEFAULT_MODEL)),
            base_url: self
                .base_url
                .unwrap_or_else(|| String::from(DEFAULT_BASE_URL)),
            api_key: self.api_key.unwrap_or_else(|| String::from(DEFAULT_API_KEY)),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            labels,
            output_dir,
        }
    }
}
