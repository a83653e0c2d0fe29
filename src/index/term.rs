//! Terms
//!
//! A term is what the query plan looks up in the term table: the hash of a
//! token (or an n-gram of tokens), the stream the token must appear in, and
//! the gram size. The raw text never travels past this point; everything
//! downstream works with the hash.

use crate::util::murmur_hash2_64;

/// Partition of a document into named regions (title, body, ...).
pub type StreamId = u8;

/// Number of tokens folded into an n-gram term.
pub type GramSize = u8;

/// 64-bit term hash.
pub type TermHash = u64;

// Stream-specific seed so the same text in different streams produces
// unrelated row sets.
const TERM_SEED: u64 = 0xb1e9_5bd1_c6a4_a793;

// Joins n-gram tokens before hashing. Cannot occur inside a token.
const GRAM_SEPARATOR: &str = "\0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    hash: TermHash,
    stream: StreamId,
    gram_size: GramSize,
}

impl Term {
    /// A single-token term.
    pub fn new(text: &str, stream: StreamId) -> Self {
        Self {
            hash: murmur_hash2_64(text.as_bytes(), TERM_SEED ^ stream as u64),
            stream,
            gram_size: 1,
        }
    }

    /// An n-gram term over consecutive tokens.
    pub fn gram(tokens: &[String], stream: StreamId) -> Self {
        debug_assert!(!tokens.is_empty(), "empty gram");
        let joined = tokens.join(GRAM_SEPARATOR);
        Self {
            hash: murmur_hash2_64(joined.as_bytes(), TERM_SEED ^ stream as u64),
            stream,
            gram_size: tokens.len().min(GramSize::MAX as usize) as GramSize,
        }
    }

    pub fn hash(&self) -> TermHash {
        self.hash
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn gram_size(&self) -> GramSize {
        self.gram_size
    }
}
