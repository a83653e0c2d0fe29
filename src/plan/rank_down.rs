//! Rank-down compiler
//!
//! Translates the rewritten match tree into the compile-tree IR. The tree
//! is traversed right to left so the leftmost leaf becomes the outermost
//! `LoadRowJz` (the one instruction that loads rather than ANDs the
//! accumulator). Whenever a leaf's rank exceeds the rank compiled so far,
//! the accumulated subtree is wrapped in a `RankDown` that drops from the
//! leaf's rank to the previous one. Or nodes fork: each branch compiles in
//! a fresh context and the branches are unified at the higher of their
//! final ranks.
//!
//! The maximum rank encountered becomes the plan's initial rank: it
//! determines the interpreter's iteration step and the shape of the
//! dedupe buffer.

use crate::index::row_id::Rank;
use crate::plan::compile_node::CompileNode;
use crate::plan::rank_zero;
use crate::plan::row_match::RowMatchNode;

pub struct RankDownCompiler {
    current_rank: Rank,
    max_rank: Rank,
    accumulator: Option<Box<CompileNode>>,
}

impl RankDownCompiler {
    pub fn new() -> Self {
        Self {
            current_rank: 0,
            max_rank: 0,
            accumulator: None,
        }
    }

    pub fn compile(&mut self, root: &RowMatchNode) {
        self.compile_internal(root, true);
    }

    pub fn maximum_rank(&self) -> Rank {
        self.max_rank
    }

    /// The finished tree, wrapped in an outer `RankDown` when the caller's
    /// initial rank exceeds the rank compiled so far.
    pub fn create_tree(&mut self, initial_rank: Rank) -> CompileNode {
        if initial_rank > self.current_rank {
            let child = self.accumulator.take().expect("compile before create_tree");
            self.accumulator = Some(Box::new(CompileNode::RankDown {
                delta: initial_rank - self.current_rank,
                child,
            }));
            self.set_rank(initial_rank);
        }
        *self.accumulator.take().expect("compile before create_tree")
    }

    fn compile_internal(&mut self, root: &RowMatchNode, leftmost: bool) {
        self.current_rank = 0;
        self.accumulator = None;
        self.traverse(root, leftmost);
    }

    fn traverse(&mut self, node: &RowMatchNode, leftmost: bool) {
        match node {
            RowMatchNode::And(left, right) => {
                self.traverse(right, false);
                self.traverse(left, leftmost);
            }
            RowMatchNode::Or(left, right) => {
                let mut left_compiler = RankDownCompiler::new();
                left_compiler.compile_internal(left, leftmost);
                let mut right_compiler = RankDownCompiler::new();
                right_compiler.compile_internal(right, leftmost);

                let rank = left_compiler.current_rank.max(right_compiler.current_rank);
                self.accumulator = Some(Box::new(CompileNode::Or {
                    left: Box::new(left_compiler.create_tree(rank)),
                    right: Box::new(right_compiler.create_tree(rank)),
                }));
                self.set_rank(rank);
            }
            RowMatchNode::Report(child) => {
                let compiled = child.as_ref().map(|c| Box::new(rank_zero::compile(c)));
                self.accumulator = Some(Box::new(CompileNode::Report { child: compiled }));
            }
            RowMatchNode::Row(row) => {
                if self.accumulator.is_none() {
                    self.accumulator = Some(Box::new(CompileNode::Report { child: None }));
                }
                if row.rank() > self.current_rank {
                    let child = self.accumulator.take().expect("accumulator just ensured");
                    self.accumulator = Some(Box::new(CompileNode::RankDown {
                        delta: row.rank() - self.current_rank,
                        child,
                    }));
                    self.set_rank(row.rank());
                }
                let child = self.accumulator.take().expect("accumulator just ensured");
                self.accumulator = Some(Box::new(if leftmost {
                    CompileNode::LoadRowJz { row: *row, child }
                } else {
                    CompileNode::AndRowJz { row: *row, child }
                }));
            }
            RowMatchNode::Not(_) => {
                panic!("Not node must be lifted to rank zero before rank-down compilation")
            }
        }
    }

    fn set_rank(&mut self, rank: Rank) {
        self.current_rank = rank;
        if rank > self.max_rank {
            self.max_rank = rank;
        }
    }
}

impl Default for RankDownCompiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a rewritten tree and return it with its initial rank.
pub fn compile(root: &RowMatchNode) -> (CompileNode, Rank) {
    let mut compiler = RankDownCompiler::new();
    compiler.compile(root);
    let initial_rank = compiler.maximum_rank();
    let tree = compiler.create_tree(initial_rank);
    (tree, initial_rank)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::compile;
    use crate::plan::row_match::{AbstractRow, RowMatchNode};

    #[test]
    fn test_single_rank0_chain() {
        // And(r0, And(r1, Report)) compiles to
        // LoadRowJz(r0, AndRowJz(r1, Report)).
        let tree = RowMatchNode::and(
            RowMatchNode::row(AbstractRow::new(0, 0, false)),
            RowMatchNode::and(
                RowMatchNode::row(AbstractRow::new(1, 0, false)),
                std::rc::Rc::new(RowMatchNode::Report(None)),
            ),
        );
        let (compiled, initial_rank) = compile(&tree);
        assert_eq!(initial_rank, 0);
        assert_eq!(
            compiled.format(),
            "LoadRowJz {\n  Row: Row(0, 0, 0, false),\n  Child: AndRowJz {\n    Row: Row(1, 0, 0, false),\n    Child: Report {\n      Child: \n    }\n  }\n}"
        );
    }

    #[test]
    fn test_rank_transition_wraps_rank_down() {
        // A rank-3 row left of rank-0 rows: the rank-0 chain is wrapped in
        // a RankDown(3) and the rank-3 row loads outermost.
        let tree = RowMatchNode::and(
            RowMatchNode::row(AbstractRow::new(2, 3, false)),
            RowMatchNode::and(
                RowMatchNode::row(AbstractRow::new(0, 0, false)),
                RowMatchNode::and(
                    RowMatchNode::row(AbstractRow::new(1, 0, false)),
                    std::rc::Rc::new(RowMatchNode::Report(None)),
                ),
            ),
        );
        let (compiled, initial_rank) = compile(&tree);
        assert_eq!(initial_rank, 3);
        let text = compiled.format();
        assert!(text.starts_with("LoadRowJz {\n  Row: Row(2, 3, 0, false)"));
        assert!(text.contains("RankDown {\n    Delta: 3"));
        // The report sits at the bottom of the chain.
        assert!(text.contains("Report"));
    }

    #[test]
    fn test_or_branches_unify_at_max_rank() {
        // Or of a rank-3 branch and a rank-0 branch: the rank-0 branch is
        // brought up to rank 3 by an outer RankDown.
        let left = RowMatchNode::and(
            RowMatchNode::row(AbstractRow::new(0, 3, false)),
            std::rc::Rc::new(RowMatchNode::Report(None)),
        );
        let right = RowMatchNode::and(
            RowMatchNode::row(AbstractRow::new(1, 0, false)),
            std::rc::Rc::new(RowMatchNode::Report(None)),
        );
        let tree = RowMatchNode::or(left, right);
        let (compiled, initial_rank) = compile(&tree);
        assert_eq!(initial_rank, 3);
        let text = compiled.format();
        assert!(text.starts_with("Or {"));
        // Right branch acquires the rank-down wrapper.
        assert!(text.contains("RankDown {\n      Delta: 3"));
    }

    #[test]
    fn test_bare_row_gets_implicit_report() {
        let tree = RowMatchNode::row(AbstractRow::new(0, 0, false));
        let (compiled, initial_rank) = compile(&tree);
        assert_eq!(initial_rank, 0);
        assert_eq!(
            compiled.format(),
            "LoadRowJz {\n  Row: Row(0, 0, 0, false),\n  Child: Report {\n    Child: \n  }\n}"
        );
    }
}
