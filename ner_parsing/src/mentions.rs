/**
Ordered mapping from an entity type to the mentions of that type.
*/
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Mapping from an entity type (such as `"LOC"`) to the ordered list of its mentions.
///
/// Types keep their insertion order: the order of first occurrence when the map is built by
/// decoding a label sequence, or the key order of the JSON object it was read from. This order is
/// observable when re-tagging a document, since later types overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MentionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map holding an empty list for every given type.
    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        types
            .into_iter()
            .map(|t| (t.into(), Vec::new()))
            .collect()
    }

    /// Mentions of `entity_type`. A type absent from the map has no mention.
    pub fn get(&self, entity_type: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(t, _)| t == entity_type)
            .map(|(_, m)| m.as_slice())
            .unwrap_or(&[])
    }

    /// Appends a mention to the list of its type. A new type is placed after the existing ones.
    pub fn push(&mut self, entity_type: &str, mention: String) {
        match self.entries.iter_mut().find(|(t, _)| t == entity_type) {
            Some((_, mentions)) => mentions.push(mention),
            None => self
                .entries
                .push((String::from(entity_type), vec![mention])),
        }
    }

    /// Replaces the mentions of a type, keeping its position when it is already present.
    pub fn insert(&mut self, entity_type: String, mentions: Vec<String>) -> Option<Vec<String>> {
        match self.entries.iter_mut().find(|(t, _)| *t == entity_type) {
            Some((_, old)) => Some(std::mem::replace(old, mentions)),
            None => {
                self.entries.push((entity_type, mentions));
                None
            }
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(t, m)| (t.as_str(), m.as_slice()))
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of mentions, all types included.
    pub fn mention_count(&self) -> usize {
        self.entries.iter().map(|(_, m)| m.len()).sum()
    }
}

impl FromIterator<(String, Vec<String>)> for MentionMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        let mut map = MentionMap::new();
        for (entity_type, mentions) in iter {
            map.insert(entity_type, mentions);
        }
        map
    }
}

impl<'a> IntoIterator for &'a MentionMap {
    type Item = &'a (String, Vec<String>);
    type IntoIter = std::slice::Iter<'a, (String, Vec<String>)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for MentionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (entity_type, mentions) in self.entries.iter() {
            map.serialize_entry(entity_type, mentions)?;
        }
        map.end()
    }
}

struct MentionMapVisitor;

impl<'de> Visitor<'de> for MentionMapVisitor {
    type Value = MentionMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map from entity type to a list of mentions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = MentionMap::new();
        // Duplicated keys: the last one wins, at the position of the first one.
        while let Some((entity_type, mentions)) = access.next_entry::<String, Vec<String>>()? {
            map.insert(entity_type, mentions);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for MentionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MentionMapVisitor)
    }
}
