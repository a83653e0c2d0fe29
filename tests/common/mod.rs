//! Shared test scaffolding
//!
//! [`ByteCodeVerifier`] checks a matching program stated as compile-tree
//! text against row data read straight out of the slice buffers: the test
//! declares which physical rows back the plan's abstract ids, states the
//! accumulator it expects at every iteration, and `verify` runs the
//! interpreter and compares the full (slice, document index) result sets.

use bitsieve::{
    ByteCodeGenerator, ByteCodeInterpreter, CompileNode, QueryInstrumentation, Rank,
    ResultsBuffer, RowId, Shard, SimpleIndex, SliceId, Term, TermTable,
};

pub struct ByteCodeVerifier<'a> {
    index: &'a SimpleIndex,
    initial_rank: Rank,
    row_offsets: Vec<usize>,
    expected: Vec<(SliceId, usize)>,
}

impl<'a> ByteCodeVerifier<'a> {
    pub fn new(index: &'a SimpleIndex, initial_rank: Rank) -> Self {
        Self {
            index,
            initial_rank,
            row_offsets: Vec::new(),
            expected: Vec::new(),
        }
    }

    /// Back the next abstract row id with the first physical row of the
    /// term `text`.
    pub fn declare_row(&mut self, text: &str) {
        let rows = self.index.term_table().rows_for_term(&Term::new(text, 0));
        assert!(!rows.is_empty(), "term '{}' has no rows", text);
        self.declare_physical_row(rows.rows()[0]);
    }

    /// Back the next abstract row id with an explicit physical row.
    pub fn declare_physical_row(&mut self, row: RowId) {
        self.row_offsets.push(self.index.shard(0).row_offset(row));
    }

    pub fn iterations_per_slice(&self) -> usize {
        self.index.shard(0).slice_capacity() >> 6 >> self.initial_rank
    }

    /// Iteration numbers across every slice of the shard.
    pub fn iterations(&self) -> Vec<usize> {
        let count = self.iterations_per_slice() * self.index.shard(0).slices().len();
        (0..count).collect()
    }

    pub fn slice_number(&self, iteration: usize) -> usize {
        iteration / self.iterations_per_slice()
    }

    pub fn offset(&self, iteration: usize) -> usize {
        iteration % self.iterations_per_slice()
    }

    /// Read the quadword of declared row `row` at `offset` in `slice`.
    pub fn row_data(&self, row: usize, offset: usize, slice: usize) -> u64 {
        let buffer = self.index.shard(0).slices()[slice].buffer();
        buffer[self.row_offsets[row] + offset]
    }

    /// Expect one match per set bit of `accumulator` at the rank-0 offset
    /// `offset` of `slice`. A zero accumulator expects nothing.
    pub fn expect_result(&mut self, accumulator: u64, offset: usize, slice: usize) {
        if accumulator == 0 {
            return;
        }
        let slice_id = self.index.shard(0).slices()[slice].id();
        let mut bits = accumulator;
        while bits != 0 {
            let bit = bits.trailing_zeros() as usize;
            self.expected.push((slice_id, offset * 64 + bit));
            bits &= bits - 1;
        }
    }

    /// Compile `code_text`, run it over the shard, and compare the
    /// observed matches against the expectations.
    pub fn verify(&self, code_text: &str) {
        let tree = CompileNode::parse(code_text).expect("well-formed compile tree");
        let mut code = ByteCodeGenerator::new();
        tree.compile(&mut code);
        code.seal();

        let shard = self.index.shard(0);
        let mut results = ResultsBuffer::new(shard.slice_capacity() * shard.slices().len());
        let mut instrumentation = QueryInstrumentation::new();
        let mut interpreter = ByteCodeInterpreter::new(
            &code,
            &mut results,
            shard.slices(),
            self.iterations_per_slice(),
            &self.row_offsets,
            None,
            &mut instrumentation,
            None,
        );
        assert!(!interpreter.run(), "no early termination expected");

        let mut observed: Vec<(SliceId, usize)> =
            results.iter().map(|m| (m.slice, m.index)).collect();
        let mut expected = self.expected.clone();
        observed.sort_unstable();
        expected.sort_unstable();
        assert_eq!(observed, expected, "program:\n{}", code_text);
    }
}
