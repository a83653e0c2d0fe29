//! Query planner
//!
//! Drives a parsed term match tree through conversion, rewriting, and
//! rank-down compilation, producing the compile tree the code generator
//! lowers, the plan's initial rank, and its row set.

use std::io::Write;

use log::debug;

use crate::diag::DiagnosticStream;
use crate::error::Result;
use crate::index::row_id::Rank;
use crate::index::term_table::TermTable;
use crate::plan::compile_node::CompileNode;
use crate::plan::converter::{self, RowSet};
use crate::plan::rank_down;
use crate::plan::rewriter;
use crate::plan::term_match::TermMatchNode;

// ============================================================================
// Configuration
// ============================================================================

/// Rewriter bounds. Both are heuristics, not contracts: the row target
/// stops cross-product expansion once the fast rank-down path has enough
/// rows to make matches sparse, and the term target caps the exponential
/// blow-up of multiplying Or subtrees out.
#[derive(Clone, Copy, Debug)]
pub struct PlannerConfig {
    pub target_row_count: usize,
    pub target_cross_product_terms: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            target_row_count: 500,
            target_cross_product_terms: 180,
        }
    }
}

// ============================================================================
// QueryPlan
// ============================================================================

pub struct QueryPlan {
    pub compile_tree: CompileNode,
    pub initial_rank: Rank,
    pub row_set: RowSet,
}

/// Plan `tree` against `term_table`.
pub fn plan(
    tree: &TermMatchNode,
    term_table: &dyn TermTable,
    config: &PlannerConfig,
    diagnostic: Option<&mut DiagnosticStream>,
) -> Result<QueryPlan> {
    let (row_tree, row_set) = converter::convert(tree, term_table)?;
    let rewritten = rewriter::rewrite(
        &row_tree,
        config.target_row_count,
        config.target_cross_product_terms,
    );
    let (compile_tree, initial_rank) = rank_down::compile(&rewritten);

    debug!(
        "planned query: {} rows, initial rank {}",
        row_set.len(),
        initial_rank
    );
    if let Some(diag) = diagnostic {
        if diag.is_enabled("planning/rowplan") {
            let text = rewritten.format();
            let _ = writeln!(diag.stream(), "RowPlan:");
            let _ = writeln!(diag.stream(), "{}", text);
        }
        if diag.is_enabled("planning/compiletree") {
            let text = compile_tree.format();
            let _ = writeln!(diag.stream(), "CompileTree ({} rows):", row_set.len());
            let _ = writeln!(diag.stream(), "{}", text);
        }
    }

    Ok(QueryPlan {
        compile_tree,
        initial_rank,
        row_set,
    })
}

// ============================================================================
// Tests
// ============================================================================
