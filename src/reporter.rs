/**
This modules gives a few tools to prettyprint the output for all the classes and the overall
metrics, and to flatten them into the single row written by the token-level evaluation.
*/
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, PartialOrd};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::io::Write;
use std::str::FromStr;

/// The reporter holds the metrics of every class and the overall metrics. It can be used to
/// display the results (i.e. prettyprint them) as if they were collected into a dataframe and can
/// be consumed to obtain a `HashSet` containing the metrics. The reporter is built with the
/// `classification_report` function.
///
/// The overall averages are displayed first (weighted, micro, macro), then the classes in
/// alphabetical order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Reporter {
    pub(crate) classes: BTreeSet<ClassMetricsInner>,
}

/// By converting the reporter into a `HashSet` of `ClassMetrics`, you lose the ordering
/// implemented for the reporter. If you mean to consume the data without prettypriting it, this is
/// not a problem.
impl From<Reporter> for HashSet<ClassMetrics> {
    fn from(value: Reporter) -> Self {
        value.classes.into_iter().map(ClassMetrics::from).collect()
    }
}

impl Reporter {
    pub(crate) fn insert(&mut self, metrics: ClassMetricsInner) -> bool {
        self.classes.insert(metrics)
    }

    /// Metrics of the entity types, in alphabetical order.
    pub fn per_class(&self) -> impl Iterator<Item = ClassMetrics> + '_ {
        self.classes
            .iter()
            .filter(|c| c.average == Average::None)
            .cloned()
            .map(ClassMetrics::from)
    }

    /// Metrics of one of the overall averages.
    pub fn overall(&self, average: OverallAverage) -> Option<ClassMetrics> {
        let average = Average::from(average);
        self.classes
            .iter()
            .find(|c| c.average == average)
            .cloned()
            .map(ClassMetrics::from)
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Class, Precision, Recall, Fscore, Support")?;
        for v in self.classes.iter() {
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Datastructure holding metrics about a given class.
pub struct ClassMetrics {
    /// The class, such as "LOC", "STREET", "BUILDING", etc.
    pub class: String,
    /// The average used to compute this class' metrics
    pub average: Average,
    /// Precision metric
    pub precision: f32,
    /// Recall metric
    pub recall: f32,
    /// Fscore metric
    pub fscore: f32,
    /// Support metric
    pub support: usize,
}

impl Hash for ClassMetrics {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class.hash(state);
        self.average.hash(state)
    }
}

impl PartialEq for ClassMetrics {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetrics {}

impl From<ClassMetricsInner> for ClassMetrics {
    fn from(value: ClassMetricsInner) -> Self {
        Self {
            class: value.class,
            average: value.average,
            precision: value.precision,
            recall: value.recall,
            fscore: value.fscore,
            support: value.support,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// ClassMetricsInner hold the metrics for a single class. They implement a special version of the
/// `Display` trait, allowing them to be treated as the line of a dataframe. Two metrics are equal
/// when they have the same class and average, whatever their values.
pub(crate) struct ClassMetricsInner {
    /// The class, such as "LOC", "STREET", "BUILDING", etc.
    pub(crate) class: String,
    /// The average used to compute this class' metrics
    pub(crate) average: Average,
    /// Precision metric
    pub(crate) precision: f32,
    /// Recall metric
    pub(crate) recall: f32,
    /// Fscore metric
    pub(crate) fscore: f32,
    /// Support metric
    pub(crate) support: usize,
}
impl PartialEq for ClassMetricsInner {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetricsInner {}

impl PartialOrd for ClassMetricsInner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassMetricsInner {
    fn cmp(&self, other: &Self) -> Ordering {
        self.average
            .cmp(&other.average)
            .then_with(|| self.class.cmp(&other.class))
    }
}

impl ClassMetricsInner {
    pub(crate) fn new_overall(
        average: OverallAverage,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        let class = average.to_string();
        ClassMetricsInner {
            class,
            average: average.into(),
            precision,
            recall,
            fscore,
            support,
        }
    }
}

/// The Classmetrics struct acts as a line in a dataframe when displayed.
impl Display for ClassMetricsInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.class, self.precision, self.recall, self.fscore, self.support
        )
    }
}

/// Enumeration of the different types of averaging possible and supported by this crate. &str can
/// be parsed to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}
impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(AverageParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct AverageParsingError(String);
impl Display for AverageParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into an Average",
            self.0
        )
    }
}

impl Average {
    /// Position of the average in a report.
    fn rank(&self) -> u8 {
        match self {
            Self::Weighted => 0,
            Self::Micro => 1,
            Self::Macro => 2,
            Self::None => 3,
        }
    }
}

/// Overall averages sort before the classes: weighted, micro, then macro.
impl PartialOrd for Average {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Average {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl Display for OverallAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str_content = match self {
            Self::Micro => "Overall_Micro",
            Self::Macro => "Overall_Macro",
            Self::Weighted => "Overall_Weighted",
        };
        write!(f, "{}", str_content)
    }
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}

/// Metrics of one entity type, as reported by SeqEval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of reference entities of this type.
    pub number: usize,
}

/// Result of the token-level evaluation, shaped like the output of the `seqeval` metric: one entry
/// per entity type, then the micro averages and the token accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SeqevalScores {
    pub per_type: BTreeMap<String, TypeMetrics>,
    pub overall_precision: f32,
    pub overall_recall: f32,
    pub overall_f1: f32,
    pub overall_accuracy: f32,
}

impl SeqevalScores {
    pub fn new(reporter: &Reporter, accuracy: f32) -> Self {
        let per_type = reporter
            .per_class()
            .map(|c| {
                let metrics = TypeMetrics {
                    precision: c.precision,
                    recall: c.recall,
                    f1: c.fscore,
                    number: c.support,
                };
                (c.class, metrics)
            })
            .collect();
        let micro = reporter.overall(OverallAverage::Micro);
        Self {
            per_type,
            overall_precision: micro.as_ref().map_or(0.0, |m| m.precision),
            overall_recall: micro.as_ref().map_or(0.0, |m| m.recall),
            overall_f1: micro.as_ref().map_or(0.0, |m| m.fscore),
            overall_accuracy: accuracy,
        }
    }

    /// Flattens the scores into `(column, value)` pairs: `<TYPE>_precision`, `<TYPE>_recall`,
    /// `<TYPE>_f1` and `<TYPE>_number` for every type in alphabetical order, then the overall
    /// metrics.
    pub fn flatten(&self) -> Vec<(String, f32)> {
        let mut row = Vec::with_capacity(self.per_type.len() * 4 + 4);
        for (entity_type, m) in self.per_type.iter() {
            row.push((format!("{}_precision", entity_type), m.precision));
            row.push((format!("{}_recall", entity_type), m.recall));
            row.push((format!("{}_f1", entity_type), m.f1));
            row.push((format!("{}_number", entity_type), m.number as f32));
        }
        row.push((String::from("overall_precision"), self.overall_precision));
        row.push((String::from("overall_recall"), self.overall_recall));
        row.push((String::from("overall_f1"), self.overall_f1));
        row.push((String::from("overall_accuracy"), self.overall_accuracy));
        row
    }

    /// Writes the flattened scores as a tab-separated table: a header line and a single row.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let row = self.flatten();
        let header: Vec<&str> = row.iter().map(|(k, _)| k.as_str()).collect();
        let values: Vec<String> = row.iter().map(|(_, v)| v.to_string()).collect();
        writeln!(writer, "{}", header.join("\t"))?;
        writeln!(writer, "{}", values.join("\t"))?;
        writer.flush()
    }
}

/// One line per column, like a transposed dataframe.
impl Display for SeqevalScores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let row = self.flatten();
        let width = row.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in row {
            writeln!(f, "{:<width$}  {}", key, value, width = width)?;
        }
        Ok(())
    }
}
