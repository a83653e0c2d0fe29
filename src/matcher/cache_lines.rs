//! Cache-line recorder
//!
//! Optional instrumentation for the matching loop: a dense bit set with
//! one bit per cache line of a slice buffer. Each row load marks the line
//! of the accessed word; at slice end the popcount feeds the query's
//! cache-line tally. Enabled by the `planning/countcachelines` diagnostic
//! keyword.

use crate::util::BitVec;

pub const BYTES_PER_CACHE_LINE: usize = 64;

const WORDS_PER_CACHE_LINE: usize = BYTES_PER_CACHE_LINE / 8;

pub struct CacheLineRecorder {
    lines: BitVec,
}

impl CacheLineRecorder {
    /// `slice_buffer_words` is the slice buffer size in 64-bit words.
    pub fn new(slice_buffer_words: usize) -> Self {
        let line_count =
            (slice_buffer_words + WORDS_PER_CACHE_LINE - 1) / WORDS_PER_CACHE_LINE;
        Self {
            lines: BitVec::new(line_count),
        }
    }

    /// Forget all recorded accesses; called at each slice boundary.
    pub fn reset(&mut self) {
        self.lines.clear();
    }

    /// Mark the cache line containing the word at `word_offset` within
    /// the slice buffer.
    pub fn record_access(&mut self, word_offset: usize) {
        self.lines.set(word_offset / WORDS_PER_CACHE_LINE);
    }

    pub fn cache_lines_accessed(&self) -> usize {
        self.lines.count_ones()
    }
}
