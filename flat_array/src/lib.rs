//! Flat storage for a list of sequences.
//!
//! Evaluating a corpus means walking many short label sequences, one per document. Instead of
//! keeping a `Vec<Vec<T>>`, the `FlatArray` stores every element in one contiguous buffer and keeps
//! the boundaries of each sequence in a second buffer. The whole content can then be scanned in a
//! single pass (token accuracy) while the per-sequence view stays available (entity chunking).
use std::slice::Iter;

/// Custom datastructure built for reducing cache misses.
///
/// `indices` always starts with `0` and has one more element than the number of sequences: the
/// sequence `i` lives in `content[indices[i]..indices[i + 1]]`. Empty sequences are kept.
#[derive(Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Clone)]
pub struct FlatArray<T> {
    content: Box<[T]>,
    indices: Box<[usize]>,
}

impl<T> Default for FlatArray<T> {
    fn default() -> Self {
        Self {
            content: Box::new([]),
            indices: Box::new([0]),
        }
    }
}

impl<T> FlatArray<T> {
    pub fn new(vecs: Vec<Vec<T>>) -> Self {
        Self::from(vecs)
    }

    /// Total number of elements, all sequences included.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Number of sequences stored.
    pub fn n_arrays(&self) -> usize {
        self.indices.len() - 1
    }

    /// Every element, sequence after sequence.
    pub fn get_content(&self) -> &[T] {
        &self.content
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.content.iter()
    }

    /// Iterates over the sequences, in insertion order.
    pub fn iter_arrays(&self) -> ArraysIter<'_, T> {
        ArraysIter {
            flat_array: self,
            position: 0,
        }
    }

    /// Length of each sequence, in insertion order.
    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.windows(2).map(|w| w[1] - w[0])
    }
}

impl<T> From<Vec<Vec<T>>> for FlatArray<T> {
    #[inline(always)]
    fn from(value: Vec<Vec<T>>) -> Self {
        let length: usize = value.iter().map(|v| v.len()).sum();
        let mut flattened = Vec::with_capacity(length);
        let mut indices = Vec::with_capacity(value.len() + 1);
        indices.push(0);
        for vec in value.into_iter() {
            flattened.extend(vec);
            indices.push(flattened.len());
        }
        Self {
            content: flattened.into_boxed_slice(),
            indices: indices.into_boxed_slice(),
        }
    }
}

pub struct ArraysIter<'a, T> {
    flat_array: &'a FlatArray<T>,
    position: usize,
}

impl<'a, T> Iterator for ArraysIter<'a, T> {
    type Item = &'a [T];
    fn next(&mut self) -> Option<Self::Item> {
        let start = *self.flat_array.indices.get(self.position)?;
        let end = *self.flat_array.indices.get(self.position + 1)?;
        self.position += 1;
        self.flat_array.content.get(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.flat_array.n_arrays().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for ArraysIter<'_, T> {}

/// This method allocates.
impl<T: Clone> From<&FlatArray<T>> for Vec<Vec<T>> {
    fn from(value: &FlatArray<T>) -> Self {
        value.iter_arrays().map(Vec::from).collect()
    }
}
