//! Query planning
//!
//! Everything between a parsed term match tree and a sealed bytecode
//! program: term-to-row conversion, the match-tree rewriter that shapes the
//! plan for rank-descending evaluation, the rank-down and rank-zero
//! compilers producing the compile-tree IR, the register allocator for the
//! optional native backend, and the planner driver tying them together.

pub mod compile_node;
pub mod converter;
pub mod planner;
pub mod rank_down;
pub mod rank_zero;
pub mod register;
pub mod rewriter;
pub mod row_match;
pub mod term_match;
mod text;

pub use compile_node::{CodeGenerator, CompileNode, Label};
pub use converter::{convert, RowSet};
pub use planner::{plan, PlannerConfig, QueryPlan};
pub use register::RegisterAllocator;
pub use row_match::{AbstractRow, RowMatchNode};
pub use term_match::TermMatchNode;
