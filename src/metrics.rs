/**
This module computes the token-level metrics (precision, recall, f-score, support and accuracy) of
reference and predicted label sequences. Entities are chunked the way SeqEval does in its default
mode, and two entities match when they have the same type, the same sequence and the same span.
*/
use crate::config::SeqevalConfig;
use crate::reporter::{Average, ClassMetricsInner, OverallAverage, Reporter, SeqevalScores};
use ahash::AHashSet;
use core::fmt;
use flatarray::FlatArray;
use itertools::multizip;
use named_entity_parsing::{get_entities_lenient, Entities, ParsingError};
use ndarray::{prelude::*, Array, Data, Zip};
use ndarray_stats::{errors::MultiInputError, SummaryStatisticsExt};
use num::Num;
use std::{
    collections::BTreeSet,
    error::Error,
    fmt::{Debug, Display},
    str::FromStr,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNotUniqueOrEmpty(usize);

impl Display for ArrayNotUniqueOrEmpty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "This array contains more than one element or is empty. It has length: {} Cannot call `item` on it", self.0
        )
    }
}
impl Error for ArrayNotUniqueOrEmpty {}

trait ItemArrayExt<Output> {
    /// Returns the element out of the Array. Can return an error if the array is empty of if the
    /// array has a length superior to 1.
    fn item(&self) -> Result<Output, ArrayNotUniqueOrEmpty>;
}

impl<F: Clone, T: Data<Elem = F>> ItemArrayExt<F> for ArrayBase<T, Dim<[usize; 1]>> {
    fn item(&self) -> Result<F, ArrayNotUniqueOrEmpty> {
        match (self.len(), self.first()) {
            (1, Some(first)) => Ok(first.clone()),
            (n, _) => Err(ArrayNotUniqueOrEmpty(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// How do we handle cases with a division by zero? Do we replace the result by 1, return an
/// error, or replace the result by 0? SeqEval uses by default the `ReplaceBy0` strategy. The
/// `ReturnError` strategy stops the computation at the first zero denominator.
pub enum DivByZeroStrat {
    /// Returns 1 when the denominator is 0
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// Returns 0 when the denominator is 0
    #[default]
    ReplaceBy0,
}

#[derive(Debug)]
pub struct ParsingDivisionByZeroStrategyError<S: Debug + Display>(S);

impl<S: Debug + Display> Display for ParsingDivisionByZeroStrategyError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse the {} into a a `DivisionByZeroStrategy`",
            self.0
        )
    }
}
impl<S: Debug + Display> Error for ParsingDivisionByZeroStrategyError<S> {}

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby1" | "replacebyone" | "1" => Ok(DivByZeroStrat::ReplaceBy1),
            "replaceby0" | "replacebyzero" | "0" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionByZeroError;

impl Display for DivisionByZeroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered division by zero")
    }
}

impl Error for DivisionByZeroError {}

fn prf_divide<I: Debug + Num + Clone + Send + Sync + Copy, D: Dimension>(
    numerator: ArcArray<I, D>,
    denominator: ArrayViewMut<I, D>,
    parallel: bool,
    zero_division: DivByZeroStrat,
) -> Result<ArcArray<I, D>, DivisionByZeroError> {
    let (mut result, zero_mask) = if parallel {
        par_prf_divide_results_and_mask(numerator, denominator)
    } else {
        prf_divide_results_and_mask(numerator, denominator)
    };

    match zero_division {
        DivByZeroStrat::ReturnError if zero_mask.iter().any(|m| *m == I::zero()) => {
            Err(DivisionByZeroError)
        }
        DivByZeroStrat::ReturnError => Ok(result),
        DivByZeroStrat::ReplaceBy1 => {
            let set_one = |r: &mut I, m: &I| {
                if *m == I::zero() {
                    *r = I::one()
                }
            };
            if parallel {
                Zip::from(&mut result).and(&zero_mask).par_for_each(set_one);
            } else {
                Zip::from(&mut result).and(&zero_mask).for_each(set_one);
            }
            Ok(result)
        }
        DivByZeroStrat::ReplaceBy0 => {
            let final_result = result * zero_mask;
            Ok(final_result)
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
/// Error type to represent when two lists or arrays are not of the
/// same length (when they should be).
pub struct InconsistentLengthError(pub usize, pub usize);

impl Display for InconsistentLengthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent length between two lists. `y_true` is length {}, `y_pred` is length {}",
            self.0, self.1
        )
    }
}
impl Error for InconsistentLengthError {}

fn check_for_empty_slices<T>(y_true: &[T], y_pred: &[T]) -> Result<(), ComputationError<String>> {
    if y_true.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_true")));
    };
    if y_pred.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_pred")));
    };
    Ok(())
}

/// Checks that both corpora hold the same number of sequences, and that every pair of sequences
/// has the same length.
fn check_consistent_length<T>(
    y_true: &FlatArray<T>,
    y_pred: &FlatArray<T>,
) -> Result<(), InconsistentLengthError> {
    let y_true_len = y_true.n_arrays();
    let y_pred_len = y_pred.n_arrays();
    if y_true_len != y_pred_len {
        return Err(InconsistentLengthError(y_true_len, y_pred_len));
    }
    for (t_l, p_l) in y_true.lengths().zip(y_pred.lengths()) {
        if t_l != p_l {
            return Err(InconsistentLengthError(t_l, p_l));
        }
    }
    Ok(())
}

/// predicted sum, true positive sum and true sum
type ActualTPCorrect<T> = (Array1<T>, Array1<T>, Array1<T>);

/// Counts, for every entity type found in either corpus, the predicted entities, the correctly
/// predicted entities and the reference entities. The types are returned in sorted order, aligned
/// with the three arrays.
fn extract_tp_actual_correct<'a>(
    entities_true: &Entities<'a>,
    entities_pred: &Entities<'a>,
) -> (Vec<&'a str>, ActualTPCorrect<usize>) {
    let true_by_tag = entities_true.by_tag();
    let pred_by_tag = entities_pred.by_tag();
    let target_names: BTreeSet<&'a str> = true_by_tag
        .keys()
        .chain(pred_by_tag.keys())
        .copied()
        .collect();
    let empty = AHashSet::default();
    let mut pred_sum = Vec::with_capacity(target_names.len());
    let mut tp_sum = Vec::with_capacity(target_names.len());
    let mut true_sum = Vec::with_capacity(target_names.len());
    for type_name in target_names.iter() {
        let true_set = true_by_tag.get(type_name).unwrap_or(&empty);
        let pred_set = pred_by_tag.get(type_name).unwrap_or(&empty);
        pred_sum.push(pred_set.len());
        tp_sum.push(true_set.intersection(pred_set).count());
        true_sum.push(true_set.len());
    }
    (
        target_names.into_iter().collect(),
        (
            Array::from(pred_sum),
            Array::from(tp_sum),
            Array::from(true_sum),
        ),
    )
}

#[derive(Debug, Clone, PartialEq)]
/// Enum error encompassing many type of failures that could happen when computing the precison,
/// recall, f-score and the support.
pub enum ComputationError<S: AsRef<str> + std::fmt::Debug> {
    BetaNotPositive,
    InconsistentLenght(InconsistentLengthError),
    ParsingError(ParsingError<S>),
    DivisionByZero(DivisionByZeroError),
    InputError(MultiInputError),
    EmptyOrNotUnique(ArrayNotUniqueOrEmpty),
    EmptyInput(String),
}
impl<S: AsRef<str> + std::fmt::Debug> Display for ComputationError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BetaNotPositive => write!(f, "Beta value is not positive"),
            Self::InconsistentLenght(length_err) => std::fmt::Display::fmt(length_err, f),
            Self::ParsingError(parsing_err) => std::fmt::Display::fmt(&parsing_err, f),
            Self::DivisionByZero(div_err) => std::fmt::Display::fmt(&div_err, f),
            Self::InputError(input_err) => std::fmt::Display::fmt(&input_err, f),
            Self::EmptyOrNotUnique(size_err) => std::fmt::Display::fmt(size_err, f),
            Self::EmptyInput(which) => write!(f, "Received an empty input {}", which),
        }
    }
}
impl<S: AsRef<str> + std::fmt::Debug> Error for ComputationError<S> {}

impl<S: AsRef<str> + std::fmt::Debug> From<ParsingError<S>> for ComputationError<S> {
    fn from(value: ParsingError<S>) -> Self {
        Self::ParsingError(value)
    }
}

impl<S: AsRef<str> + std::fmt::Debug> From<InconsistentLengthError> for ComputationError<S> {
    fn from(value: InconsistentLengthError) -> Self {
        Self::InconsistentLenght(value)
    }
}

impl<S: AsRef<str> + std::fmt::Debug> From<DivisionByZeroError> for ComputationError<S> {
    fn from(value: DivisionByZeroError) -> Self {
        Self::DivisionByZero(value)
    }
}

impl<S: AsRef<str> + std::fmt::Debug> From<MultiInputError> for ComputationError<S> {
    fn from(value: MultiInputError) -> Self {
        Self::InputError(value)
    }
}

impl<S: AsRef<str> + std::fmt::Debug> From<ArrayNotUniqueOrEmpty> for ComputationError<S> {
    fn from(value: ArrayNotUniqueOrEmpty) -> Self {
        Self::EmptyOrNotUnique(value)
    }
}

/// Type alias for representing the output of the `precision_recall_fscore_support`. Each arrays
/// contain a vector of f32. The first array contains the precision, the second the recall, the
/// third the f-score and the last one the support.
pub type PrecisionRecallFScoreTrueSum = (
    Array<f32, Dim<[usize; 1]>>,
    Array<f32, Dim<[usize; 1]>>,
    Array<f32, Dim<[usize; 1]>>,
    Array<usize, Dim<[usize; 1]>>,
);

/// Computes the precision, recall, fscore and support of the reference and predicted label
/// sequences. With `Average::None`, the arrays hold one value per entity type, in sorted order of
/// the types. This method does NOT check the lengths of `y_true` and `y_pred`.
///
/// * `y_true`: Reference labels
/// * `y_pred`: Predicted labels
/// * `beta`: Value of the `beta` parameter of the fscore. `beta=1` for F1 and `beta=0.5` for F0.5.
/// * `average`: What type of average to use.
/// * `config`: How to parse the labels and what to do with zero denominators.
pub fn precision_recall_fscore_support<S: AsRef<str>>(
    y_true: &FlatArray<S>,
    y_pred: &FlatArray<S>,
    beta: f32,
    average: Average,
    config: &SeqevalConfig,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError<String>> {
    check_for_empty_slices(y_true.get_content(), y_pred.get_content())?;
    let entities_true = get_entities_lenient(y_true, config.suffix, config.delimiter)?;
    let entities_pred = get_entities_lenient(y_pred, config.suffix, config.delimiter)?;
    let (_, sums) = extract_tp_actual_correct(&entities_true, &entities_pred);
    precision_recall_fscore_support_inner(
        &sums,
        beta,
        average,
        config.zero_division,
        config.parallel,
    )
}

fn precision_recall_fscore_support_inner(
    sums: &ActualTPCorrect<usize>,
    beta: f32,
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError<String>> {
    if beta.is_sign_negative() {
        return Err(ComputationError::BetaNotPositive);
    };
    let (mut pred_sum, mut tp_sum, mut true_sum) = sums.clone();
    let beta2 = beta.powi(2);
    if matches!(average, Average::Micro) {
        tp_sum = array![tp_sum.sum()];
        pred_sum = array![pred_sum.sum()];
        true_sum = array![true_sum.sum()];
    };
    let arc_tp_sum = tp_sum.mapv(|x| x as f32).to_shared();
    let precision = prf_divide(
        arc_tp_sum.clone(), // ArcArray are (often) inexpensive to clone.
        pred_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let recall = prf_divide(
        arc_tp_sum,
        true_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let f_score: ArcArray<f32, Dim<[usize; 1]>> = if beta2.is_infinite() {
        recall.clone()
    } else {
        let denom = precision.clone() + recall.view();
        let denom_non_zero = if parallel {
            par_replace(denom, 0.0, 1.0)
        } else {
            replace(denom, 0.0, 1.0)
        };
        (beta2 + 1.0) * precision.clone() * recall.view() / denom_non_zero
    };
    match average {
        Average::None | Average::Micro => Ok((
            precision.into_owned(),
            recall.into_owned(),
            f_score.into_owned(),
            true_sum,
        )),
        // Without any type, the averages are 0.
        _ if true_sum.is_empty() => Ok((array![0.0], array![0.0], array![0.0], array![0])),
        Average::Weighted => {
            let total = true_sum.sum();
            if total == 0 {
                let fill = match zero_division {
                    DivByZeroStrat::ReturnError => {
                        return Err(ComputationError::DivisionByZero(DivisionByZeroError))
                    }
                    DivByZeroStrat::ReplaceBy1 => 1.0,
                    DivByZeroStrat::ReplaceBy0 => 0.0,
                };
                return Ok((array![fill], array![fill], array![fill], array![0]));
            };
            let weights = true_sum.mapv(|x| x as f32).into_shared();
            let final_precision = array![precision.weighted_mean(&weights)?];
            let final_recall = array![recall.weighted_mean(&weights)?];
            let final_f_score = array![f_score.weighted_mean(&weights)?];
            Ok((final_precision, final_recall, final_f_score, array![total]))
        }
        Average::Macro => {
            let final_precision = array![precision.mean().unwrap_or(0.0)];
            let final_recall = array![recall.mean().unwrap_or(0.0)];
            let final_f_score = array![f_score.mean().unwrap_or(0.0)];
            Ok((
                final_precision,
                final_recall,
                final_f_score,
                array![true_sum.sum()],
            ))
        }
    }
}

/// This function computes the result in parallel. For a synchronous
/// version of this function, see `prf_divide_results`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn par_prf_divide_results_and_mask<I: Debug + Num + Clone + Send + Sync, D: Dimension>(
    numerator: ArcArray<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (ArcArray<I, D>, Array<I, D>) {
    let zero_at_mask = Zip::from(&mut denominator).par_map_collect(|d| {
        if *d == I::zero() {
            I::zero()
        } else {
            I::one()
        }
    });
    denominator.par_mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, zero_at_mask)
}

/// This function computes the result synchronously. For a parallel
/// version of this function, see `par_prf_divide_results`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn prf_divide_results_and_mask<I: Debug + Num + Clone, D: Dimension>(
    numerator: ArcArray<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (ArcArray<I, D>, Array<I, D>) {
    let zero_at_mask =
        Zip::from(&mut denominator)
            .map_collect(|d| if *d == I::zero() { I::zero() } else { I::one() });
    denominator.mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, zero_at_mask)
}

/// Helper function to replace values from an array.
fn replace<Data: PartialEq + Copy, D: Dimension>(
    mut array: ArcArray<Data, D>,
    replaced: Data,
    new_value: Data,
) -> ArcArray<Data, D> {
    array.mapv_inplace(|v| if v == replaced { new_value } else { v });
    array
}

/// Helper function to replace values from an array in parallel.
fn par_replace<Data: PartialEq + Send + Sync + Copy, D: Dimension>(
    mut array: ArcArray<Data, D>,
    replaced: Data,
    new_value: Data,
) -> ArcArray<Data, D> {
    array.par_mapv_inplace(|v| if v == replaced { new_value } else { v });
    array
}

/// Fraction of the positions where the reference and the predicted labels are equal, all
/// sequences included.
pub fn accuracy_score<S: AsRef<str>>(
    y_true: &FlatArray<S>,
    y_pred: &FlatArray<S>,
) -> Result<f32, ComputationError<String>> {
    check_for_empty_slices(y_true.get_content(), y_pred.get_content())?;
    if y_true.len() != y_pred.len() {
        return Err(InconsistentLengthError(y_true.len(), y_pred.len()).into());
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t.as_ref() == p.as_ref())
        .count();
    Ok(correct as f32 / y_true.len() as f32)
}

/// This function computes the precision, recall, fscore and support of the reference and
/// predicted labels, for every entity type and for the micro, macro and weighted averages. The
/// returned structure can be used to prettyprint the results.
///
/// * `y_true`: Reference labels, one sequence per document
/// * `y_pred`: Predicted labels, aligned with `y_true`
/// * `config`: How to parse the labels and what to do with zero denominators.
///
/// # Example
/// ```rust
/// use flatarray::FlatArray;
/// use nereval::{classification_report, SeqevalConfig};
///
/// let y_true = FlatArray::new(vec![vec!["B-TEST", "B-NOTEST", "O", "B-TEST"]]);
/// let y_pred = FlatArray::new(vec![vec!["O", "B-NOTEST", "B-OTHER", "B-TEST"]]);
/// let reporter = classification_report(&y_true, &y_pred, &SeqevalConfig::default()).unwrap();
/// let expected_report = "Class, Precision, Recall, Fscore, Support
/// Overall_Weighted, 1, 0.6666667, 0.77777785, 3
/// Overall_Micro, 0.6666667, 0.6666667, 0.6666667, 3
/// Overall_Macro, 0.6666667, 0.5, 0.5555556, 3
/// NOTEST, 1, 1, 1, 1
/// OTHER, 0, 0, 0, 0
/// TEST, 1, 0.5, 0.6666667, 2\n";
/// assert_eq!(expected_report, reporter.to_string());
/// ```
pub fn classification_report<S: AsRef<str>>(
    y_true: &FlatArray<S>,
    y_pred: &FlatArray<S>,
    config: &SeqevalConfig,
) -> Result<Reporter, ComputationError<String>> {
    check_consistent_length(y_true, y_pred)?;
    check_for_empty_slices(y_true.get_content(), y_pred.get_content())?;
    let entities_true = get_entities_lenient(y_true, config.suffix, config.delimiter)?;
    let entities_pred = get_entities_lenient(y_pred, config.suffix, config.delimiter)?;
    debug!(
        reference_entities = entities_true.iter().count(),
        predicted_entities = entities_pred.iter().count(),
        "chunked label sequences"
    );
    let (target_names, sums) = extract_tp_actual_correct(&entities_true, &entities_pred);
    let (p, r, f1, s) = precision_recall_fscore_support_inner(
        &sums,
        1.0,
        Average::None,
        config.zero_division,
        config.parallel,
    )?;
    let mut reporter = Reporter::default();
    for (name, precision, recall, fscore, support) in multizip((
        target_names.iter(),
        p.into_iter(),
        r.into_iter(),
        f1.into_iter(),
        s.into_iter(),
    )) {
        let tmp_metrics = ClassMetricsInner {
            class: String::from(*name),
            precision,
            recall,
            fscore,
            support,
            average: Average::None,
        };
        reporter.insert(tmp_metrics);
    }
    for avg in [
        OverallAverage::Micro,
        OverallAverage::Macro,
        OverallAverage::Weighted,
    ]
    .into_iter()
    {
        let (p, r, f1, s) = precision_recall_fscore_support_inner(
            &sums,
            1.0,
            avg.into(),
            config.zero_division,
            config.parallel,
        )?;
        let tmp_metrics =
            ClassMetricsInner::new_overall(avg, p.item()?, r.item()?, f1.item()?, s.item()?);
        reporter.insert(tmp_metrics);
    }
    Ok(reporter)
}

/// SeqEval-compatible evaluation: per-type precision, recall, f1 and number of reference
/// entities, the micro average of these metrics and the token accuracy.
///
/// * `references`: Reference labels, one sequence per document
/// * `predictions`: Predicted labels, aligned with `references`
pub fn seqeval<S: AsRef<str>>(
    references: &FlatArray<S>,
    predictions: &FlatArray<S>,
    config: &SeqevalConfig,
) -> Result<SeqevalScores, ComputationError<String>> {
    let reporter = classification_report(references, predictions, config)?;
    let accuracy = accuracy_score(references, predictions)?;
    Ok(SeqevalScores::new(&reporter, accuracy))
}
