/*!
Set-based scoring of mention predictions.

Each document contributes, for every entity type, the set of its gold mentions and the set of its
predicted mentions. True positives are the mentions found in both sets, so a mention repeated in a
document counts once.
*/
use crate::{read_json, MentionMap, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;
use std::path::Path;
use tracing::{info, warn};

/// Rounds to 4 decimals, halves to even.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Counts of a single entity type, summed over the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl Counts {
    fn add(&mut self, other: Counts) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }

    /// Counts of a type in a single document.
    fn of_document(gold: &[String], pred: &[String]) -> Self {
        let gold: HashSet<&str> = gold.iter().map(String::as_str).collect();
        let pred: HashSet<&str> = pred.iter().map(String::as_str).collect();
        Self {
            tp: gold.intersection(&pred).count(),
            fp: pred.difference(&gold).count(),
            fn_: gold.difference(&pred).count(),
        }
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }
}

/// Scores of an entity type. The ratios are rounded to 4 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl From<Counts> for TypeScore {
    fn from(counts: Counts) -> Self {
        let precision = counts.precision();
        let recall = counts.recall();
        Self {
            precision: round4(precision),
            recall: round4(recall),
            f1: round4(f1(precision, recall)),
            tp: counts.tp,
            fp: counts.fp,
            fn_: counts.fn_,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroScore {
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overall {
    pub micro: MicroScore,
    #[serde(rename = "macro")]
    pub macro_: MacroScore,
}

/// Result of the set-based evaluation: one score per entity type, in alphabetical order, and the
/// overall averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub per_type: BTreeMap<String, TypeScore>,
    pub overall: Overall,
}

impl Display for ScoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "===== Per-Type Scores =====")?;
        for (entity_type, s) in self.per_type.iter() {
            writeln!(
                f,
                "{: <10} | P: {}, R: {}, F1: {}, TP: {}, FP: {}, FN: {}",
                entity_type, s.precision, s.recall, s.f1, s.tp, s.fp, s.fn_
            )?;
        }
        writeln!(f, "===== Overall Scores =====")?;
        let micro = &self.overall.micro;
        writeln!(
            f,
            "Micro | P: {}, R: {}, F1: {}",
            micro.precision, micro.recall, micro.f1
        )?;
        writeln!(f, "Macro | F1: {}", self.overall.macro_.f1)
    }
}

/// Scores the predicted mentions against the gold mentions, document by document.
///
/// The two slices are aligned by position. When their lengths differ, only the common prefix is
/// scored.
///
/// # Example
/// ```rust
/// use nereval::scoring::score_documents;
/// use nereval::MentionMap;
///
/// let mut gold = MentionMap::new();
/// gold.push("LOC", String::from("Paris"));
/// gold.push("LOC", String::from("France"));
/// let mut pred = MentionMap::new();
/// pred.push("LOC", String::from("Paris"));
/// let report = score_documents(&[gold], &[pred]);
/// assert_eq!(report.per_type["LOC"].precision, 1.0);
/// assert_eq!(report.per_type["LOC"].recall, 0.5);
/// assert_eq!(report.overall.micro.f1, 0.6667);
/// ```
pub fn score_documents(gold: &[MentionMap], pred: &[MentionMap]) -> ScoreReport {
    if gold.len() != pred.len() {
        warn!(
            gold = gold.len(),
            pred = pred.len(),
            "gold and predicted documents are not aligned, scoring the common prefix"
        );
    }
    let pairs: Vec<(&MentionMap, &MentionMap)> = gold.iter().zip(pred.iter()).collect();
    let universe: BTreeSet<&str> = pairs
        .iter()
        .flat_map(|(g, p)| g.types().chain(p.types()))
        .collect();
    let mut per_type = BTreeMap::new();
    let mut micro = Counts::default();
    for entity_type in universe {
        let mut counts = Counts::default();
        for (g, p) in pairs.iter() {
            counts.add(Counts::of_document(g.get(entity_type), p.get(entity_type)));
        }
        micro.add(counts);
        per_type.insert(entity_type.to_string(), TypeScore::from(counts));
    }
    let macro_f1 = if per_type.is_empty() {
        0.0
    } else {
        per_type.values().map(|s| s.f1).sum::<f64>() / per_type.len() as f64
    };
    let (micro_precision, micro_recall) = (micro.precision(), micro.recall());
    ScoreReport {
        per_type,
        overall: Overall {
            micro: MicroScore {
                precision: round4(micro_precision),
                recall: round4(micro_recall),
                f1: round4(f1(micro_precision, micro_recall)),
            },
            macro_: MacroScore {
                f1: round4(macro_f1),
            },
        },
    }
}

/// Only the mentions of a record, read from its `entities` or `preds` field.
#[derive(Debug, Deserialize)]
struct GoldMentions {
    #[serde(default)]
    entities: MentionMap,
}

#[derive(Debug, Deserialize)]
struct PredictedMentions {
    #[serde(default)]
    preds: MentionMap,
}

/// Scores a prediction file against a gold file. Gold mentions are read from the `entities` field
/// of each record and predictions from the `preds` field.
pub fn evaluate_files<P: AsRef<Path>, Q: AsRef<Path>>(gold_path: P, pred_path: Q) -> Result<ScoreReport> {
    let gold: Vec<GoldMentions> = read_json(gold_path.as_ref())?;
    let pred: Vec<PredictedMentions> = read_json(pred_path.as_ref())?;
    info!(
        gold = gold.len(),
        pred = pred.len(),
        "loaded gold and predicted documents"
    );
    let gold: Vec<MentionMap> = gold.into_iter().map(|g| g.entities).collect();
    let pred: Vec<MentionMap> = pred.into_iter().map(|p| p.preds).collect();
    Ok(score_documents(&gold, &pred))
}
