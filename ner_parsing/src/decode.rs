/**
This module decodes a BIO label sequence into named entity mentions.
*/
use crate::mentions::MentionMap;

/// A label of the BIO scheme, borrowed from the raw label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioLabel<'a> {
    /// `B-<TYPE>`: first token of a mention.
    Begin(&'a str),
    /// `I-<TYPE>`: continuation of a mention of the same type.
    Inside(&'a str),
    /// `O`, or any label that is neither `B-` nor `I-`.
    Outside,
}

impl<'a> BioLabel<'a> {
    pub fn parse(label: &'a str) -> Self {
        if let Some(entity_type) = label.strip_prefix("B-") {
            BioLabel::Begin(entity_type)
        } else if let Some(entity_type) = label.strip_prefix("I-") {
            BioLabel::Inside(entity_type)
        } else {
            BioLabel::Outside
        }
    }
}

/// The mention being read. It is open when `entity_type` is `Some`.
struct OpenMention<'a> {
    entity_type: Option<&'a str>,
    tokens: Vec<&'a str>,
}

impl<'a> OpenMention<'a> {
    fn new() -> Self {
        Self {
            entity_type: None,
            tokens: Vec::new(),
        }
    }

    fn open(&mut self, entity_type: &'a str, token: &'a str) {
        self.entity_type = Some(entity_type);
        self.tokens.push(token);
    }

    /// Moves the buffered tokens, if any, into `mentions` and closes the mention.
    fn flush(&mut self, mentions: &mut MentionMap) {
        if let Some(entity_type) = self.entity_type.take() {
            if !self.tokens.is_empty() {
                mentions.push(entity_type, self.tokens.join(" "));
            }
        }
        self.tokens.clear();
    }
}

/// Groups the tokens of a tagged sequence into mentions, per entity type.
///
/// `I-<T>` only extends a mention opened by `B-<T>` (or continued by `I-<T>`). An `I-` tag of
/// another type, or one without any open mention, closes the current mention and is itself
/// treated as `O`: no mention is ever started by an `I-` tag. Duplicated mentions are kept.
///
/// The two slices are read in parallel; extra elements of the longer one are ignored.
///
/// ```rust
/// use named_entity_parsing::extract_mentions;
///
/// let tokens = ["Paris", ",", "rue", "de", "Rivoli"];
/// let labels = ["B-LOC", "O", "B-STREET", "I-STREET", "I-STREET"];
/// let mentions = extract_mentions(&tokens, &labels);
/// assert_eq!(mentions.get("LOC"), ["Paris"]);
/// assert_eq!(mentions.get("STREET"), ["rue de Rivoli"]);
/// ```
pub fn extract_mentions<T, L>(tokens: &[T], labels: &[L]) -> MentionMap
where
    T: AsRef<str>,
    L: AsRef<str>,
{
    let mut mentions = MentionMap::new();
    let mut current = OpenMention::new();
    for (token, label) in tokens.iter().zip(labels.iter()) {
        let token = token.as_ref();
        match BioLabel::parse(label.as_ref()) {
            BioLabel::Begin(entity_type) => {
                current.flush(&mut mentions);
                current.open(entity_type, token);
            }
            BioLabel::Inside(entity_type) if current.entity_type == Some(entity_type) => {
                current.tokens.push(token);
            }
            _ => current.flush(&mut mentions),
        }
    }
    current.flush(&mut mentions);
    mentions
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use enum_iterator::{all, Sequence};
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
    use rstest::rstest;

    #[rstest]
    #[case("B-LOC", BioLabel::Begin("LOC"))]
    #[case("I-STREET", BioLabel::Inside("STREET"))]
    #[case("O", BioLabel::Outside)]
    #[case("B-", BioLabel::Begin(""))]
    #[case("LOC", BioLabel::Outside)]
    #[case("", BioLabel::Outside)]
    fn test_parse_label(#[case] raw: &str, #[case] expected: BioLabel) {
        assert_eq!(BioLabel::parse(raw), expected)
    }

    #[test]
    fn test_extract_mentions() {
        let tokens = ["The", "Strand", ",", "London", "and", "Paris"];
        let labels = ["O", "B-STREET", "O", "B-LOC", "O", "B-LOC"];
        let mentions = extract_mentions(&tokens, &labels);
        assert_eq!(mentions.types().collect::<Vec<_>>(), vec!["STREET", "LOC"]);
        assert_eq!(mentions.get("STREET"), ["Strand"]);
        assert_eq!(mentions.get("LOC"), ["London", "Paris"]);
    }

    #[test]
    fn test_adjacent_begin_splits_mentions() {
        let tokens = ["New", "York", "Boston"];
        let labels = ["B-LOC", "I-LOC", "B-LOC"];
        let mentions = extract_mentions(&tokens, &labels);
        assert_eq!(mentions.get("LOC"), ["New York", "Boston"]);
    }

    #[rstest]
    #[case(&["I-LOC", "I-LOC"], vec![])]
    #[case(&["B-LOC", "I-STREET", "I-STREET"], vec![("LOC", vec!["a"])])]
    #[case(&["B-LOC", "O", "I-LOC"], vec![("LOC", vec!["a"])])]
    #[case(
        &["B-LOC", "I-STREET", "B-STREET", "I-STREET"],
        vec![("LOC", vec!["a"]), ("STREET", vec!["c d"])]
    )]
    fn test_orphan_inside_is_a_break(
        #[case] labels: &[&str],
        #[case] expected: Vec<(&str, Vec<&str>)>,
    ) {
        let tokens = ["a", "b", "c", "d"];
        let mentions = extract_mentions(&tokens[..labels.len()], labels);
        let expected: MentionMap = expected
            .into_iter()
            .map(|(t, m)| (t.to_string(), m.into_iter().map(String::from).collect()))
            .collect();
        assert_eq!(mentions, expected);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let tokens = ["Paris", "and", "Paris"];
        let labels = ["B-LOC", "O", "B-LOC"];
        assert_eq!(extract_mentions(&tokens, &labels).get("LOC"), ["Paris", "Paris"]);
    }

    #[test]
    fn test_empty_sequence() {
        let empty: [&str; 0] = [];
        assert!(extract_mentions(&empty, &empty).is_empty());
    }

    #[derive(Debug, PartialEq, Hash, Clone, Copy, Sequence, Eq)]
    pub(crate) enum LabelsToTest {
        BLOC,
        ILOC,
        BSTREET,
        ISTREET,
        O,
    }

    impl From<LabelsToTest> for &str {
        fn from(value: LabelsToTest) -> Self {
            match value {
                LabelsToTest::BLOC => "B-LOC",
                LabelsToTest::ILOC => "I-LOC",
                LabelsToTest::BSTREET => "B-STREET",
                LabelsToTest::ISTREET => "I-STREET",
                LabelsToTest::O => "O",
            }
        }
    }

    impl Arbitrary for LabelsToTest {
        fn arbitrary(g: &mut Gen) -> Self {
            let choices: Vec<LabelsToTest> = all::<LabelsToTest>().collect();
            *g.choose(choices.as_ref()).unwrap()
        }
    }

    /// Length of every contiguous run started by `B-` and continued by `I-` of the same type.
    fn expected_runs(labels: &[&str]) -> Vec<(String, usize)> {
        let mut runs: Vec<(String, usize)> = vec![];
        let mut open: Option<&str> = None;
        for label in labels {
            match BioLabel::parse(label) {
                BioLabel::Begin(t) => {
                    runs.push((t.to_string(), 1));
                    open = Some(t);
                }
                BioLabel::Inside(t) if open == Some(t) => runs.last_mut().unwrap().1 += 1,
                _ => open = None,
            }
        }
        runs
    }

    #[test]
    fn test_propertie_types_and_token_counts() {
        fn propertie(labels: Vec<LabelsToTest>) -> TestResult {
            let labels: Vec<&str> = labels.into_iter().map(<&str>::from).collect();
            let tokens: Vec<String> = (0..labels.len()).map(|i| format!("t{}", i)).collect();
            let mentions = extract_mentions(&tokens, &labels);
            let mut begin_types: Vec<&str> = labels
                .iter()
                .filter_map(|l| l.strip_prefix("B-"))
                .collect();
            begin_types.sort();
            begin_types.dedup();
            let mut actual_types: Vec<&str> = mentions.types().collect();
            actual_types.sort();
            if actual_types != begin_types {
                return TestResult::failed();
            }
            let runs = expected_runs(&labels);
            for entity_type in mentions.types() {
                let expected_counts: Vec<usize> = runs
                    .iter()
                    .filter(|(t, _)| t == entity_type)
                    .map(|(_, n)| *n)
                    .collect();
                let actual_counts: Vec<usize> = mentions
                    .get(entity_type)
                    .iter()
                    .map(|m| m.split(' ').count())
                    .collect();
                if expected_counts != actual_counts {
                    return TestResult::failed();
                }
            }
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .quickcheck(propertie as fn(Vec<LabelsToTest>) -> TestResult)
    }
}
