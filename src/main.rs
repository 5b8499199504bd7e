use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nereval::config::{DEFAULT_API_KEY, DEFAULT_BASE_URL, DEFAULT_MODEL, OUTPUT_DIR_ENV};
use nereval::corpus::{read_corpus, DocumentRecord};
use nereval::iob::{evaluate_iob_files, json_to_iob, write_scores_tsv};
use nereval::predict::{predict_documents, write_predictions, ChatCompletionPredictor};
use nereval::scoring::evaluate_files;
use nereval::{
    read_json, write_json, DivByZeroStrat, RunConfig, RunConfigBuilder, SeqevalConfigBuilder,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CORPUS_JSON: &str = "HIPE-prep.json";

#[derive(Parser, Debug)]
#[command(
    name = "nereval",
    version,
    about = "Prepare a HIPE corpus, predict entity mentions with an LLM and score the predictions"
)]
struct Cli {
    /// Directory of the outputs. Defaults to `output/<user>`.
    #[arg(long, global = true, env = OUTPUT_DIR_ENV)]
    output_dir: Option<PathBuf>,
    /// Model name, also used to name the output files.
    #[arg(long, global = true, env = "NEREVAL_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converts a tagged TSV corpus into JSON document records.
    Prepare {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Asks the model for the mentions of every document.
    Predict {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, env = "NEREVAL_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,
        #[arg(long, env = "NEREVAL_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
        api_key: String,
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
        #[arg(long, value_delimiter = ',', default_value = "LOC,STREET,BUILDING")]
        labels: Vec<String>,
    },
    /// Set-based precision, recall and f1 of the predicted mentions.
    Evaluate {
        #[arg(long)]
        gold: PathBuf,
        #[arg(long)]
        pred: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Token-level (SeqEval) evaluation of the re-tagged documents.
    EvaluateIob {
        #[arg(long)]
        gold: PathBuf,
        #[arg(long)]
        pred: Option<PathBuf>,
        #[arg(long)]
        gold_iob: Option<PathBuf>,
        #[arg(long)]
        pred_iob: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// What to do with a zero denominator: replaceby0, replaceby1 or error.
        #[arg(long, default_value = "replaceby0")]
        zero_division: DivByZeroStrat,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run_config(cli_output_dir: Option<PathBuf>, model: String) -> RunConfigBuilder {
    let builder = RunConfigBuilder::new().model(model);
    match cli_output_dir {
        Some(dir) => builder.output_dir(dir),
        None => builder,
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let builder = run_config(cli.output_dir, cli.model);

    match cli.command {
        Commands::Prepare { corpus, output } => {
            let config = builder.build();
            let output = output.unwrap_or_else(|| config.output_dir().join(DEFAULT_CORPUS_JSON));
            let documents = read_corpus(&corpus)
                .with_context(|| format!("failed to read the corpus {}", corpus.display()))?;
            write_json(&documents, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(documents = documents.len(), path = %output.display(), "wrote document records");
        }
        Commands::Predict {
            input,
            output,
            base_url,
            api_key,
            timeout_secs,
            labels,
        } => {
            let config = builder
                .base_url(base_url)
                .api_key(api_key)
                .timeout(Duration::from_secs(timeout_secs))
                .labels(labels)
                .build();
            info!("{}", config);
            let output = output.unwrap_or_else(|| config.prediction_path());
            let documents: Vec<DocumentRecord> = read_json(&input)
                .with_context(|| format!("failed to read the documents {}", input.display()))?;
            let predictor = ChatCompletionPredictor::new(&config)
                .context("failed to build the HTTP client")?;
            let records = predict_documents(&predictor, &documents, &config.labels);
            write_predictions(&records, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), "wrote predictions");
        }
        Commands::Evaluate { gold, pred, output } => {
            let config = builder.build();
            let pred = pred.unwrap_or_else(|| config.prediction_path());
            let output = output.unwrap_or_else(|| config.score_path());
            let report = evaluate_files(&gold, &pred).with_context(|| {
                format!("failed to score {} against {}", pred.display(), gold.display())
            })?;
            println!("{}", report);
            write_json(&report, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), "saved set-based scores");
        }
        Commands::EvaluateIob {
            gold,
            pred,
            gold_iob,
            pred_iob,
            output,
            zero_division,
        } => {
            let config: RunConfig = builder.build();
            let pred = pred.unwrap_or_else(|| config.prediction_path());
            let gold_iob = gold_iob.unwrap_or_else(|| config.gold_iob_path());
            let pred_iob = pred_iob.unwrap_or_else(|| config.pred_iob_path());
            let output = output.unwrap_or_else(|| config.iob_score_path());
            json_to_iob(&pred, &pred_iob)
                .with_context(|| format!("failed to convert {}", pred.display()))?;
            json_to_iob(&gold, &gold_iob)
                .with_context(|| format!("failed to convert {}", gold.display()))?;
            let seqeval_config = SeqevalConfigBuilder::new()
                .division_by_zero(zero_division)
                .build();
            let scores = evaluate_iob_files(&pred_iob, &gold_iob, &seqeval_config)
                .context("token-level evaluation failed")?;
            print!("{}", scores);
            write_scores_tsv(&scores, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), "saved token-level scores");
        }
    }
    Ok(())
}
