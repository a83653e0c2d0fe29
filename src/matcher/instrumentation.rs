//! Query instrumentation
//!
//! Per-query counters and phase timers. The stopwatch starts when the
//! record is created; each `finish_*` call closes the phase that began at
//! the previous mark.

use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct InstrumentationData {
    succeeded: bool,
    row_count: usize,
    match_count: usize,
    quadword_count: usize,
    cache_line_count: usize,
    parsing_time: Duration,
    planning_time: Duration,
    matching_time: Duration,
}

impl InstrumentationData {
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Quadwords fetched by row loads during matching.
    pub fn quadword_count(&self) -> usize {
        self.quadword_count
    }

    /// Distinct cache lines touched, when the recorder was enabled.
    pub fn cache_line_count(&self) -> usize {
        self.cache_line_count
    }

    pub fn parsing_time(&self) -> Duration {
        self.parsing_time
    }

    pub fn planning_time(&self) -> Duration {
        self.planning_time
    }

    pub fn matching_time(&self) -> Duration {
        self.matching_time
    }
}

pub struct QueryInstrumentation {
    mark: Instant,
    data: InstrumentationData,
}

impl QueryInstrumentation {
    pub fn new() -> Self {
        Self {
            mark: Instant::now(),
            data: InstrumentationData::default(),
        }
    }

    pub fn query_succeeded(&mut self) {
        self.data.succeeded = true;
    }

    pub fn set_row_count(&mut self, row_count: usize) {
        self.data.row_count = row_count;
    }

    pub fn set_match_count(&mut self, match_count: usize) {
        self.data.match_count = match_count;
    }

    #[inline]
    pub fn increment_quadword_count(&mut self) {
        self.data.quadword_count += 1;
    }

    pub fn increment_cache_line_count(&mut self, amount: usize) {
        self.data.cache_line_count += amount;
    }

    pub fn finish_parsing(&mut self) {
        self.data.parsing_time = self.lap();
    }

    pub fn finish_planning(&mut self) {
        self.data.planning_time = self.lap();
    }

    pub fn finish_matching(&mut self) {
        self.data.matching_time = self.lap();
    }

    pub fn data(&self) -> &InstrumentationData {
        &self.data
    }

    fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.mark;
        self.mark = now;
        elapsed
    }
}

impl Default for QueryInstrumentation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::QueryInstrumentation;

    #[test]
    fn counters_accumulate() {
        let mut instrumentation = QueryInstrumentation::new();
        instrumentation.increment_quadword_count();
        instrumentation.increment_quadword_count();
        instrumentation.increment_cache_line_count(5);
        instrumentation.set_row_count(4);
        instrumentation.set_match_count(9);
        instrumentation.query_succeeded();

        let data = instrumentation.data();
        assert_eq!(data.quadword_count(), 2);
        assert_eq!(data.cache_line_count(), 5);
        assert_eq!(data.row_count(), 4);
        assert_eq!(data.match_count(), 9);
        assert!(data.succeeded());
    }

    #[test]
    fn phases_close_in_sequence() {
        let mut instrumentation = QueryInstrumentation::new();
        instrumentation.finish_parsing();
        instrumentation.finish_planning();
        instrumentation.finish_matching();
        let data = instrumentation.data();
        // All three phases closed without panicking; durations are
        // monotone accumulations from consecutive marks.
        let total = data.parsing_time() + data.planning_time() + data.matching_time();
        assert!(total >= data.matching_time());
    }
}
