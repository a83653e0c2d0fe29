//! Query engine façade
//!
//! Ties parsing to execution: parse a query against the stream
//! configuration, plan and compile it, seal the bytecode, then run the
//! interpreter over every shard under a reader token, filling the results
//! buffer and the instrumentation record.

use std::io::Write;

use log::debug;

use crate::diag::DiagnosticStream;
use crate::error::Result;
use crate::index::shard::Shard;
use crate::index::simple_index::SimpleIndex;
use crate::matcher::bytecode::{disassemble, ByteCodeGenerator};
use crate::matcher::cache_lines::CacheLineRecorder;
use crate::matcher::instrumentation::QueryInstrumentation;
use crate::matcher::interpreter::ByteCodeInterpreter;
use crate::matcher::results::ResultsBuffer;
use crate::parser::query::{QueryParser, StreamConfiguration};
use crate::plan::planner::{self, PlannerConfig};
use crate::plan::term_match::TermMatchNode;

pub struct QueryEngine<'a> {
    index: &'a SimpleIndex,
    streams: StreamConfiguration,
    config: PlannerConfig,
    diagnostic: DiagnosticStream,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a SimpleIndex, streams: StreamConfiguration) -> Self {
        Self {
            index,
            streams,
            config: PlannerConfig::default(),
            diagnostic: DiagnosticStream::to_stdout(),
        }
    }

    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_diagnostic_stream(mut self, diagnostic: DiagnosticStream) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    /// Parse a query into a term match tree.
    pub fn parse(&self, query: &str) -> Result<TermMatchNode> {
        QueryParser::new(query, &self.streams).parse()
    }

    /// Add a diagnostic keyword prefix to the enabled set.
    pub fn enable_diagnostic(&mut self, prefix: &str) {
        self.diagnostic.enable(prefix);
    }

    /// Remove a diagnostic keyword prefix from the enabled set.
    pub fn disable_diagnostic(&mut self, prefix: &str) {
        self.diagnostic.disable(prefix);
    }

    /// Run a parsed query, filling `results` and `instrumentation`.
    pub fn run(
        &mut self,
        tree: &TermMatchNode,
        instrumentation: &mut QueryInstrumentation,
        results: &mut ResultsBuffer,
    ) -> Result<()> {
        instrumentation.finish_parsing();

        let index = self.index;
        let plan = planner::plan(
            tree,
            index.term_table(),
            &self.config,
            Some(&mut self.diagnostic),
        )?;
        instrumentation.set_row_count(plan.row_set.len());

        let mut code = ByteCodeGenerator::new();
        plan.compile_tree.compile(&mut code);
        code.seal();

        if self.diagnostic.is_enabled("bytecode/program") {
            let listing = disassemble(code.code());
            let _ = writeln!(self.diagnostic.stream(), "{}", listing);
        }
        instrumentation.finish_planning();

        results.reset();

        // Token taken before any slice buffer is observed; released only
        // after the last interpreter returns.
        let token = index.tokens().request_token();

        let count_cache_lines = self.diagnostic.is_enabled("planning/countcachelines");
        for shard_id in 0..index.shard_count() {
            let shard = index.shard(shard_id as u16);
            let iterations_per_slice = shard.slice_capacity() >> 6 >> plan.initial_rank;
            let row_offsets = plan.row_set.row_offsets(shard);
            let recorder =
                count_cache_lines.then(|| CacheLineRecorder::new(shard.slice_buffer_size()));

            let mut interpreter = ByteCodeInterpreter::new(
                &code,
                results,
                shard.slices(),
                iterations_per_slice,
                &row_offsets,
                Some(&mut self.diagnostic),
                instrumentation,
                recorder,
            );
            interpreter.run();
        }

        instrumentation.finish_matching();
        instrumentation.set_match_count(results.len());
        instrumentation.query_succeeded();
        drop(token);

        debug!(
            "query matched {} documents over {} rows",
            results.len(),
            plan.row_set.len()
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
