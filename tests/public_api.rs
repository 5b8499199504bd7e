use flatarray::FlatArray;
use nereval::corpus::{normalize_corpus, read_corpus, DocumentRecord};
use nereval::iob::{evaluate_iob_files, json_to_iob, load_labels, write_scores_tsv};
use nereval::predict::{
    predict_documents, write_predictions, FixedPredictor, PredictError, PredictionRecord, Predictor,
};
use nereval::scoring::{evaluate_files, score_documents};
use nereval::{
    classification_report, read_json, seqeval, write_json, ClassMetrics, MentionMap,
    RunConfigBuilder, SeqevalConfig,
};
use std::collections::HashSet;
use std::fs;

pub trait CloseEnough {
    fn are_close(&self, other: &Self, eps: f32) -> bool;
}

// ClassMetrics does not have the default PartialEq implementation.
impl CloseEnough for ClassMetrics {
    fn are_close(&self, other: &Self, eps: f32) -> bool {
        let are_equal = self == other;
        let precision_is_equal = f32::abs(self.precision - other.precision) < eps;
        let recall_is_equal = f32::abs(self.recall - other.recall) < eps;
        let fscore_is_equal = f32::abs(self.fscore - other.fscore) < eps;
        are_equal && precision_is_equal && recall_is_equal && fscore_is_equal
    }
}

const CORPUS: &str = "# hipe2022:document_id = doc1
# hipe2022:date = 1860-02-12
Paris\tB-LOC\t_\t_\t_\t_\t_\t_\t_\tNoSpaceAfter
,\tO\t_\t_\t_\t_\t_\t_\t_\t_
France\tB-LOC\t_\t_\t_\t_\t_\t_\t_\t_

# hipe2022:document_id = doc2
He\tO
walked\tO
down\tO
Fleet\tB-STREET
Street\tI-STREET
to\tO
St\tB-BUILDING
Paul's\tI-BUILDING
";

/// Answers with a mapping depending on the text, and fails on empty texts.
struct LookupPredictor;

impl Predictor for LookupPredictor {
    fn predict(&self, text: &str) -> Result<MentionMap, PredictError> {
        let mut preds = MentionMap::with_types(["LOC", "STREET", "BUILDING"]);
        if text.is_empty() {
            return Err(PredictError::EmptyResponse);
        }
        if text.contains("Paris") {
            preds.push("LOC", String::from("Paris"));
        }
        if text.contains("Fleet") {
            preds.push("STREET", String::from("Fleet Street"));
            preds.push("LOC", String::from("St"));
        }
        Ok(preds)
    }
}

#[test]
fn corpus_to_scores() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfigBuilder::new()
        .output_dir(dir.path())
        .model("test/model")
        .build();
    let corpus_path = dir.path().join("corpus.tsv");
    fs::write(&corpus_path, CORPUS).unwrap();

    let documents = read_corpus(&corpus_path).unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].text, "Paris, France");
    assert_eq!(documents[1].text, "He walked down Fleet Street to St Paul's");
    let gold_path = dir.path().join("HIPE-prep.json");
    write_json(&documents, &gold_path).unwrap();

    let predictions = predict_documents(&LookupPredictor, &documents, &config.labels);
    assert!(predictions.iter().all(|p| p.error.is_none()));
    write_predictions(&predictions, config.prediction_path()).unwrap();
    let back: Vec<PredictionRecord> = read_json(config.prediction_path()).unwrap();
    assert_eq!(back, predictions);

    let report = evaluate_files(&gold_path, config.prediction_path()).unwrap();
    assert_eq!(report.per_type["LOC"].tp, 1);
    assert_eq!(report.per_type["LOC"].fp, 1);
    assert_eq!(report.per_type["LOC"].fn_, 1);
    assert_eq!(report.per_type["STREET"].f1, 1.0);
    assert_eq!(report.per_type["BUILDING"].recall, 0.0);
    assert_eq!(report.overall.micro.precision, 0.6667);
    assert_eq!(report.overall.micro.recall, 0.5);
    assert_eq!(report.overall.micro.f1, 0.5714);
    assert_eq!(report.overall.macro_.f1, 0.5);
    write_json(&report, config.score_path()).unwrap();
    assert!(config.score_path().exists());

    json_to_iob(config.prediction_path(), config.pred_iob_path()).unwrap();
    json_to_iob(&gold_path, config.gold_iob_path()).unwrap();
    let gold_labels = load_labels(config.gold_iob_path()).unwrap();
    assert_eq!(gold_labels.n_arrays(), 2);
    assert_eq!(gold_labels.len(), 10);
    let scores = evaluate_iob_files(
        config.pred_iob_path(),
        config.gold_iob_path(),
        &SeqevalConfig::default(),
    )
    .unwrap();
    // Re-tagging matches whitespace tokens, so the gold "Paris" is lost against "Paris,".
    assert_eq!(scores.per_type["LOC"].number, 1);
    assert_eq!(scores.per_type["LOC"].precision, 0.0);
    assert_eq!(scores.per_type["STREET"].f1, 1.0);
    assert_eq!(scores.per_type["BUILDING"].number, 1);
    assert_eq!(scores.overall_precision, 0.5);
    assert_eq!(scores.overall_recall, 1.0 / 3.0);
    assert_eq!(scores.overall_accuracy, 0.7);
    write_scores_tsv(&scores, config.iob_score_path()).unwrap();
    let tsv = fs::read_to_string(config.iob_score_path()).unwrap();
    assert_eq!(tsv.lines().count(), 2);
}

#[test]
fn failed_predictions_keep_the_batch() {
    let documents = vec![
        DocumentRecord {
            document_id: String::from("empty"),
            text: String::new(),
            entities: MentionMap::new(),
        },
        normalize_corpus(CORPUS.lines()).remove(0),
    ];
    let labels = ["LOC", "STREET", "BUILDING"];
    let predictions = predict_documents(&LookupPredictor, &documents, &labels);
    assert_eq!(predictions.len(), 2);
    assert_eq!(
        predictions[0].error.as_deref(),
        Some("Model error: model answer has no content")
    );
    assert_eq!(predictions[0].preds, MentionMap::with_types(labels));
    assert_eq!(predictions[1].preds.get("LOC"), ["Paris"]);

    let fixed = FixedPredictor::new("I could not find anything.", vec![String::from("LOC")]);
    let predictions = predict_documents(&fixed, &documents, &labels);
    assert!(predictions.iter().all(|p| p.error.is_none()));
    assert_eq!(predictions[1].preds, MentionMap::with_types(["LOC"]));
}

#[test]
fn set_scores_of_identical_documents() {
    let documents = normalize_corpus(CORPUS.lines());
    let gold: Vec<MentionMap> = documents.iter().map(|d| d.entities.clone()).collect();
    let report = score_documents(&gold, &gold);
    assert_eq!(report.per_type.len(), 3);
    assert!(report.per_type.values().all(|s| s.f1 == 1.0));
    assert_eq!(report.overall.macro_.f1, 1.0);
}

#[test]
fn token_level_report() {
    let y_true = FlatArray::new(vec![
        vec!["B-LOC", "I-LOC", "O", "B-STREET", "I-STREET"],
        vec!["O", "B-BUILDING", "I-BUILDING", "O"],
    ]);
    let y_pred = FlatArray::new(vec![
        vec!["B-LOC", "I-LOC", "O", "B-STREET", "O"],
        vec!["O", "I-BUILDING", "I-BUILDING", "O"],
    ]);
    let reporter = classification_report(&y_true, &y_pred, &SeqevalConfig::default()).unwrap();
    let actual: HashSet<ClassMetrics> = reporter.into();
    let expected = vec![
        ClassMetrics {
            class: String::from("LOC"),
            average: nereval::Average::None,
            precision: 1.0,
            recall: 1.0,
            fscore: 1.0,
            support: 1,
        },
        ClassMetrics {
            class: String::from("STREET"),
            average: nereval::Average::None,
            precision: 0.0,
            recall: 0.0,
            fscore: 0.0,
            support: 1,
        },
        // An `I-` after `O` opens a chunk.
        ClassMetrics {
            class: String::from("BUILDING"),
            average: nereval::Average::None,
            precision: 1.0,
            recall: 1.0,
            fscore: 1.0,
            support: 1,
        },
        ClassMetrics {
            class: String::from("Overall_Micro"),
            average: nereval::Average::Micro,
            precision: 0.6667,
            recall: 0.6667,
            fscore: 0.6667,
            support: 3,
        },
        ClassMetrics {
            class: String::from("Overall_Macro"),
            average: nereval::Average::Macro,
            precision: 0.6667,
            recall: 0.6667,
            fscore: 0.6667,
            support: 3,
        },
    ];
    for expected_class in expected.into_iter() {
        let actual_class = actual.get(&expected_class).unwrap();
        assert!(actual_class.are_close(&expected_class, 0.001));
    }

    let scores = seqeval(&y_true, &y_pred, &SeqevalConfig::default()).unwrap();
    assert_eq!(scores.overall_accuracy, 7.0 / 9.0);
}
