//! bitsieve - signature-file search engine core
//!
//! Documents are indexed as columns in a collection of bit matrices: a
//! row is a Bloom-filter bit vector for some term, a column is one
//! document. A query evaluates by bitwise-AND of term rows; set bits in
//! the resulting column vector are candidates, verified afterwards to
//! shed Bloom-filter collisions.
//!
//! This crate is the query execution engine: the rewriter that reshapes a
//! boolean match tree into a rank-descending plan, the compilers lowering
//! that plan to a small stack-plus-accumulator instruction set, and the
//! interpreter that walks slice buffers, dedupes candidate positions, and
//! materialises matches. In-memory shard and term-table implementations
//! back the engine and its tests; persistent storage, ingestion pipelines
//! and native code generation live elsewhere.

pub mod diag;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod parser;
pub mod plan;
pub mod util;
pub mod verify;

// Re-export main public types
pub use error::{Error, ErrorCode, Result};

pub use diag::DiagnosticStream;
pub use engine::QueryEngine;
pub use index::{
    prime_factors_index, DocId, DocIndex, IndexConfig, RamShard, Rank, RowId, RowIdSequence,
    Shard, ShardId, SimpleIndex, SimpleTermTable, SliceId, StreamId, Term, TermTable, Token,
    TokenManager, MAX_RANK,
};
pub use matcher::{
    ByteCodeGenerator, ByteCodeInterpreter, CacheLineRecorder, Instruction, InstrumentationData,
    Match, Opcode, QueryInstrumentation, ResultsBuffer,
};
pub use parser::{QueryParser, StreamConfiguration};
pub use plan::{
    AbstractRow, CodeGenerator, CompileNode, PlannerConfig, QueryPlan, RegisterAllocator,
    RowMatchNode, RowSet, TermMatchNode,
};
pub use verify::{
    evaluate, verify_one_query, verify_synthetic, MatchVerifier, SyntheticReport,
};
