//! Results buffer
//!
//! A bounded array of (slice, document index) pairs the interpreter
//! writes matches into. Standard layout, because the native backend
//! stores entries directly. Running out of room silently drops further
//! matches; the caller observes a truncated count via
//! [`ResultsBuffer::truncated`].

use crate::index::shard::SliceId;
use crate::index::DocIndex;

/// One match: the slice holding the document and the document's column
/// index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(C)]
pub struct Match {
    pub slice: SliceId,
    pub index: DocIndex,
}

pub struct ResultsBuffer {
    entries: Vec<Match>,
    capacity: usize,
    truncated: bool,
}

impl ResultsBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.truncated = false;
    }

    pub fn push(&mut self, slice: SliceId, index: DocIndex) {
        if self.entries.len() >= self.capacity {
            self.truncated = true;
            return;
        }
        self.entries.push(Match { slice, index });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when at least one match was dropped for lack of room.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn matches(&self) -> &[Match] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ResultsBuffer {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::ResultsBuffer;

    #[test]
    fn push_and_reset() {
        let mut buffer = ResultsBuffer::new(4);
        buffer.push(0, 7);
        buffer.push(1, 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.matches()[0].index, 7);
        buffer.reset();
        assert!(buffer.is_empty());
        assert!(!buffer.truncated());
    }

    #[test]
    fn overflow_silently_truncates() {
        let mut buffer = ResultsBuffer::new(2);
        buffer.push(0, 0);
        buffer.push(0, 1);
        buffer.push(0, 2);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.truncated());
    }
}
