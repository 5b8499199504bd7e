/**
This module chunks label sequences into entities, the way SeqEval does it in its default (lenient)
mode. Contrary to `extract_mentions`, the chunker works on positions instead of token texts and
accepts any single-char prefix among `I`, `O`, `B`, `E`, `S`, `U`, `L`. A label with another prefix
is read as `O`, with a warning.
*/
use ahash::{AHashMap, AHashSet};
use enum_iterator::{all, Sequence};
use flatarray::FlatArray;
use itertools::Itertools;
use std::error::Error;
use std::fmt::{Debug, Display};
use std::slice::Iter;
use tracing::warn;

/// Type given to a label without any type, such as `O`.
pub const NO_TYPE: &str = "_";

#[derive(Debug, PartialEq, Hash, Clone, Copy, Sequence, Eq)]
/// The prefixes accepted in a label. All of them are a single char.
pub enum UserPrefix {
    I,
    O,
    B,
    E,
    S,
    U,
    L,
}

impl TryFrom<char> for UserPrefix {
    type Error = ParsingError<String>;
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'I' => Ok(Self::I),
            'O' => Ok(Self::O),
            'B' => Ok(Self::B),
            'E' => Ok(Self::E),
            'S' => Ok(Self::S),
            'U' => Ok(Self::U),
            'L' => Ok(Self::L),
            _ => Err(ParsingError::PrefixError(String::from(value))),
        }
    }
}

impl Display for UserPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Could not parse a label into a prefix and a type.
pub enum ParsingError<S: AsRef<str>> {
    PrefixError(S),
    EmptyToken,
}

impl<S: AsRef<str>> Display for ParsingError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrefixError(s) => {
                write!(
                    f,
                    "Could not parse the following string into a Prefix: {}. Accepted prefixes are: {}",
                    s.as_ref(),
                    all::<UserPrefix>().join(", ")
                )
            }
            Self::EmptyToken => {
                write!(f, "Received an empty label")
            }
        }
    }
}

impl<S: AsRef<str> + Debug> Error for ParsingError<S> {}

/// A label split into its prefix and its type.
#[derive(Debug, PartialEq, Clone, Copy)]
struct InnerToken<'a> {
    prefix: UserPrefix,
    tag: &'a str,
}

impl<'a> InnerToken<'a> {
    /// Parses a label such as `B-LOC` (or `LOC-B` when `suffix` is true).
    ///
    /// The type is what follows the first `delimiter` after the prefix (or what precedes the last
    /// `delimiter` before a suffix). Without any delimiter, the rest of the label is the type. An
    /// empty type becomes `_`.
    fn try_new(token: &'a str, suffix: bool, delimiter: char) -> Result<Self, ParsingError<String>> {
        let (prefix_char, rest) = if suffix {
            let mut chars = token.chars();
            let last = chars.next_back().ok_or(ParsingError::EmptyToken)?;
            (last, chars.as_str())
        } else {
            let mut chars = token.chars();
            let first = chars.next().ok_or(ParsingError::EmptyToken)?;
            (first, chars.as_str())
        };
        let prefix = UserPrefix::try_from(prefix_char)
            .map_err(|_| ParsingError::PrefixError(String::from(token)))?;
        let tag = match (suffix, rest) {
            (false, rest) => rest.split_once(delimiter).map_or(rest, |(_, t)| t),
            (true, rest) => rest.rsplit_once(delimiter).map_or(rest, |(t, _)| t),
        };
        let tag = if tag.is_empty() { NO_TYPE } else { tag };
        Ok(Self { prefix, tag })
    }

    fn outside() -> Self {
        Self {
            prefix: UserPrefix::O,
            tag: NO_TYPE,
        }
    }
}

/// An entity is a chunk of a sequence: the index of the sequence in the corpus, the first and last
/// position of the chunk (both inclusive) and its type.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entity<'a> {
    pub seq: usize,
    pub start: usize,
    pub end: usize,
    pub tag: &'a str,
}

impl<'a> Entity<'a> {
    pub fn new(seq: usize, start: usize, end: usize, tag: &'a str) -> Self {
        Entity {
            seq,
            start,
            end,
            tag,
        }
    }

    /// Position of the entity, without its type.
    pub fn key(&self) -> (usize, usize, usize) {
        (self.seq, self.start, self.end)
    }
}

impl Display for Entity<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.seq, self.tag, self.start, self.end)
    }
}

/// This wrapper around the content iterator appends a single `"O"` at the end of its inner
/// iterator. The trailing `O` closes the last chunk.
struct InnerLenientChunkIter<'a, S: AsRef<str>> {
    content: Iter<'a, S>,
    is_at_end: bool,
}

impl<'a, S: AsRef<str>> InnerLenientChunkIter<'a, S> {
    fn new(seq: &'a [S]) -> Self {
        InnerLenientChunkIter {
            content: seq.iter(),
            is_at_end: false,
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for InnerLenientChunkIter<'a, S> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        match self.content.next() {
            Some(label) => Some(label.as_ref()),
            None if self.is_at_end => None,
            None => {
                self.is_at_end = true;
                Some("O")
            }
        }
    }
}

/// This struct iterates over a *single* sequence and returns the chunks associated with it.
struct LenientChunkIter<'a, S: AsRef<str>> {
    inner: InnerLenientChunkIter<'a, S>,
    /// Index of the sequence in the corpus
    seq: usize,
    /// The prefix of the previous label (e.g. 'I')
    prev_prefix: UserPrefix,
    /// The type of the previous label (e.g. `"PER"`)
    prev_type: &'a str,
    begin_offset: usize,
    suffix: bool,
    delimiter: char,
    index: usize,
}

impl<'a, S: AsRef<str>> LenientChunkIter<'a, S> {
    fn new(sequence: &'a [S], seq: usize, suffix: bool, delimiter: char) -> Self {
        LenientChunkIter {
            inner: InnerLenientChunkIter::new(sequence),
            seq,
            prev_prefix: UserPrefix::O,
            prev_type: "",
            begin_offset: 0,
            suffix,
            delimiter,
            index: 0,
        }
    }

    /// Checks if a chunk ended between the previous and current label.
    fn end_of_chunk(&self, current: &InnerToken<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (UserPrefix::E, _) | (UserPrefix::S, _) => true,
            (UserPrefix::B, UserPrefix::B | UserPrefix::S | UserPrefix::O) => true,
            (UserPrefix::I, UserPrefix::B | UserPrefix::S | UserPrefix::O) => true,
            (prev, _) => prev != UserPrefix::O && self.prev_type != current.tag,
        }
    }

    /// Checks if a chunk started between the previous and current label.
    fn start_of_chunk(&self, current: &InnerToken<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (_, UserPrefix::B | UserPrefix::S) => true,
            (UserPrefix::E | UserPrefix::S | UserPrefix::O, UserPrefix::E | UserPrefix::I) => true,
            (_, curr) => curr != UserPrefix::O && self.prev_type != current.tag,
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for LenientChunkIter<'a, S> {
    type Item = Result<Entity<'a>, ParsingError<String>>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let label = self.inner.next()?; // no more labels. We are done
            let token = match InnerToken::try_new(label, self.suffix, self.delimiter) {
                Ok(v) => v,
                Err(ParsingError::PrefixError(_)) => {
                    warn!(label, "unknown prefix, the label is read as O");
                    InnerToken::outside()
                }
                Err(e) => {
                    self.index += 1;
                    return Some(Err(e));
                }
            };
            // `end_of_chunk` is false on the first label, so `index` is at least 1 here.
            let ended = self.end_of_chunk(&token).then(|| {
                Entity::new(self.seq, self.begin_offset, self.index - 1, self.prev_type)
            });
            if self.start_of_chunk(&token) {
                self.begin_offset = self.index;
            }
            self.prev_prefix = token.prefix;
            self.prev_type = token.tag;
            self.index += 1;
            if let Some(entity) = ended {
                return Some(Ok(entity));
            }
        }
    }
}

/// Leniently retrieves the entities of every sequence.
///
/// * `sequences`: the label sequences, one per sentence or document.
/// * `suffix`: set it to `true` when the prefix is at the end of the label (`LOC-B`).
/// * `delimiter`: the char separating the prefix from the type (`-` in `B-LOC`).
pub fn get_entities_lenient<S: AsRef<str>>(
    sequences: &FlatArray<S>,
    suffix: bool,
    delimiter: char,
) -> Result<Entities<'_>, ParsingError<String>> {
    let mut res = Vec::with_capacity(sequences.n_arrays());
    for (seq, labels) in sequences.iter_arrays().enumerate() {
        let entities: Result<Vec<_>, _> =
            LenientChunkIter::new(labels, seq, suffix, delimiter).collect();
        res.push(entities?)
    }
    Ok(Entities(res))
}

#[derive(Debug, PartialEq, Clone, Default)]
/// The entities of a corpus, one vector per sequence.
pub struct Entities<'a>(Vec<Vec<Entity<'a>>>);

impl<'a> Entities<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &Entity<'a>> {
        self.0.iter().flat_map(|v| v.iter())
    }

    /// Positions of the entities, grouped by type.
    pub fn by_tag(&self) -> AHashMap<&'a str, AHashSet<(usize, usize, usize)>> {
        let mut grouped: AHashMap<&'a str, AHashSet<(usize, usize, usize)>> = AHashMap::new();
        for entity in self.iter() {
            grouped.entry(entity.tag).or_default().insert(entity.key());
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    fn tuples(entities: &Entities) -> Vec<(usize, usize, usize, String)> {
        entities
            .iter()
            .map(|e| (e.seq, e.start, e.end, e.tag.to_string()))
            .collect()
    }

    fn chunk(sequences: Vec<Vec<&str>>, suffix: bool) -> Vec<(usize, usize, usize, String)> {
        let flat = FlatArray::new(sequences);
        tuples(&get_entities_lenient(&flat, suffix, '-').unwrap())
    }

    #[rstest]
    #[case("B-PER", false, UserPrefix::B, "PER")]
    #[case("I-LOC", false, UserPrefix::I, "LOC")]
    #[case("O", false, UserPrefix::O, "_")]
    #[case("B-", false, UserPrefix::B, "_")]
    #[case("BLOC", false, UserPrefix::B, "LOC")]
    #[case("B-NAME-FIRST", false, UserPrefix::B, "NAME-FIRST")]
    #[case("PER-B", true, UserPrefix::B, "PER")]
    #[case("NAME-FIRST-I", true, UserPrefix::I, "NAME-FIRST")]
    #[case("O", true, UserPrefix::O, "_")]
    fn test_inner_token(
        #[case] label: &str,
        #[case] suffix: bool,
        #[case] prefix: UserPrefix,
        #[case] tag: &str,
    ) {
        let token = InnerToken::try_new(label, suffix, '-').unwrap();
        assert_eq!(token, InnerToken { prefix, tag });
    }

    #[rstest]
    #[case("", ParsingError::EmptyToken)]
    #[case("X-LOC", ParsingError::PrefixError(String::from("X-LOC")))]
    fn test_inner_token_errors(#[case] label: &str, #[case] expected: ParsingError<String>) {
        assert_eq!(InnerToken::try_new(label, false, '-'), Err(expected));
    }

    #[test]
    fn test_error_message_lists_prefixes() {
        let message = ParsingError::PrefixError("X-LOC").to_string();
        assert!(message.ends_with("I, O, B, E, S, U, L"));
    }

    #[test]
    fn test_get_entities() {
        let actual = chunk(
            vec![vec!["O", "O", "O", "B-MISC", "I-MISC", "I-MISC", "O", "B-PER", "I-PER"]],
            false,
        );
        let expected = vec![
            (0, 3, 5, String::from("MISC")),
            (0, 7, 8, String::from("PER")),
        ];
        assert_eq!(actual, expected)
    }

    #[test]
    fn test_get_entities_with_suffix() {
        let actual = chunk(
            vec![vec!["O", "O", "O", "MISC-B", "MISC-I", "MISC-I", "O", "PER-B", "PER-I"]],
            true,
        );
        let expected = vec![
            (0, 3, 5, String::from("MISC")),
            (0, 7, 8, String::from("PER")),
        ];
        assert_eq!(actual, expected)
    }

    #[rstest]
    // Adjacent begins are two chunks.
    #[case(vec!["B-LOC", "B-LOC"], vec![(0, 0, "LOC"), (1, 1, "LOC")])]
    // An orphan inside starts a chunk in lenient mode.
    #[case(vec!["O", "I-LOC", "I-LOC"], vec![(1, 2, "LOC")])]
    // A type change inside a chunk splits it.
    #[case(vec!["B-LOC", "I-STREET", "I-STREET"], vec![(0, 0, "LOC"), (1, 2, "STREET")])]
    #[case(vec!["B-LOC", "I-LOC", "B-STREET"], vec![(0, 1, "LOC"), (2, 2, "STREET")])]
    #[case(vec!["S-LOC", "S-LOC", "B-PER", "E-PER"], vec![(0, 0, "LOC"), (1, 1, "LOC"), (2, 3, "PER")])]
    #[case(vec!["O", "O"], vec![])]
    #[case(vec![], vec![])]
    fn test_chunk_boundaries(
        #[case] labels: Vec<&str>,
        #[case] expected: Vec<(usize, usize, &str)>,
    ) {
        let expected: Vec<(usize, usize, usize, String)> = expected
            .into_iter()
            .map(|(s, e, t)| (0, s, e, t.to_string()))
            .collect();
        assert_eq!(chunk(vec![labels], false), expected);
    }

    #[test]
    fn test_chunks_do_not_cross_sequences() {
        let actual = chunk(vec![vec!["O", "B-LOC"], vec!["I-LOC", "O"]], false);
        let expected = vec![(0, 1, 1, String::from("LOC")), (1, 0, 0, String::from("LOC"))];
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case(vec!["B-LOC", "Z-LOC"], vec![(0, 0, "LOC")])]
    #[case(vec!["B-LOC", "I-LOC", "X-LOC", "I-LOC"], vec![(0, 1, "LOC"), (3, 3, "LOC")])]
    #[case(vec!["X-LOC", "B-PER"], vec![(1, 1, "PER")])]
    fn test_unknown_prefix_reads_as_outside(
        #[case] labels: Vec<&str>,
        #[case] expected: Vec<(usize, usize, &str)>,
    ) {
        let expected: Vec<(usize, usize, usize, String)> = expected
            .into_iter()
            .map(|(s, e, t)| (0, s, e, t.to_string()))
            .collect();
        assert_eq!(chunk(vec![labels], false), expected);
    }

    #[test]
    fn test_empty_label_is_an_error() {
        let flat = FlatArray::new(vec![vec!["B-LOC", ""]]);
        let actual = get_entities_lenient(&flat, false, '-');
        assert_eq!(actual, Err(ParsingError::EmptyToken));
    }

    #[test]
    fn test_entities_by_tag() {
        let flat = FlatArray::new(vec![
            vec!["B-PER", "I-PER", "O", "B-LOC"],
            vec!["B-GEO", "I-GEO", "O", "B-GEO", "O", "B-PER", "I-PER", "I-PER", "B-LOC"],
        ]);
        let entities = get_entities_lenient(&flat, false, '-').unwrap();
        let expected_per: AHashSet<(usize, usize, usize)> =
            AHashSet::from_iter(vec![(0, 0, 1), (1, 5, 7)]);
        assert_eq!(entities.iter().count(), 6);
        let grouped = entities.by_tag();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped["GEO"].len(), 2);
        assert_eq!(grouped["PER"], expected_per);
    }

    #[derive(Debug, PartialEq, Hash, Clone, Copy, Sequence, Eq)]
    enum TokensToTest {
        BPER,
        IPER,
        EPER,
        SLOC,
        O,
    }

    impl From<TokensToTest> for &str {
        fn from(value: TokensToTest) -> Self {
            match value {
                TokensToTest::BPER => "B-PER",
                TokensToTest::IPER => "I-PER",
                TokensToTest::EPER => "E-PER",
                TokensToTest::SLOC => "S-LOC",
                TokensToTest::O => "O",
            }
        }
    }

    impl quickcheck::Arbitrary for TokensToTest {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let choices: Vec<TokensToTest> = all::<TokensToTest>().collect();
            *g.choose(choices.as_ref()).unwrap()
        }
    }

    #[test]
    fn test_propertie_chunks_are_disjoint_and_typed() {
        fn propertie(tokens: Vec<TokensToTest>) -> TestResult {
            let labels: Vec<&str> = tokens.into_iter().map(<&str>::from).collect();
            let flat = FlatArray::new(vec![labels.clone()]);
            let entities = get_entities_lenient(&flat, false, '-').unwrap();
            let mut previous_end: Option<usize> = None;
            for entity in entities.iter() {
                if entity.start > entity.end || entity.end >= labels.len() {
                    return TestResult::failed();
                }
                if previous_end.is_some_and(|end| entity.start <= end) {
                    return TestResult::failed();
                }
                if labels[entity.start..=entity.end].iter().any(|l| *l == "O") {
                    return TestResult::failed();
                }
                previous_end = Some(entity.end);
            }
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .quickcheck(propertie as fn(Vec<TokensToTest>) -> TestResult)
    }
}
