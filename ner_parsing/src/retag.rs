/**
This module re-derives a BIO label sequence from a text and its mentions. It is the inverse of
`extract_mentions`, up to one limitation: only the first occurrence of a mention is tagged.
*/
use crate::mentions::MentionMap;

pub const OUTSIDE: &str = "O";

/// Splits `text` on whitespace and labels the tokens covered by the mentions of `mentions`.
///
/// Types are visited in the order of the map and mentions in list order. For each mention, the
/// first contiguous run of tokens equal to the mention's own tokens (exact, case-sensitive match)
/// is labelled `B-<TYPE>`, `I-<TYPE>`, ... A later mention covering the same tokens overwrites
/// the previous labels. A mention that is not found leaves the labels untouched.
///
/// Repeated mentions are only tagged once, at their first occurrence: a document mentioning
/// "Paris" twice comes back with a single `Paris` chunk. Token-level scores computed on re-tagged
/// documents undercount repeated mentions.
///
/// ```rust
/// use named_entity_parsing::{retag, MentionMap};
///
/// let mut mentions = MentionMap::new();
/// mentions.push("LOC", String::from("New York"));
/// let (tokens, labels) = retag("From New York to New York", &mentions);
/// assert_eq!(tokens, ["From", "New", "York", "to", "New", "York"]);
/// assert_eq!(labels, ["O", "B-LOC", "I-LOC", "O", "O", "O"]);
/// ```
pub fn retag<'t>(text: &'t str, mentions: &MentionMap) -> (Vec<&'t str>, Vec<String>) {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut labels = vec![String::from(OUTSIDE); tokens.len()];
    for (entity_type, type_mentions) in mentions.iter() {
        for mention in type_mentions.iter() {
            let mention_tokens: Vec<&str> = mention.split_whitespace().collect();
            if let Some(start) = find_first(&tokens, &mention_tokens) {
                labels[start] = format!("B-{}", entity_type);
                for label in labels[start + 1..start + mention_tokens.len()].iter_mut() {
                    *label = format!("I-{}", entity_type);
                }
            }
        }
    }
    (tokens, labels)
}

/// Index of the first window of `haystack` equal to `needle`. An empty needle is never found.
fn find_first(haystack: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
