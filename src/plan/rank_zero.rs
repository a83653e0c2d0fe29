//! Rank-zero compiler
//!
//! Lowers subtrees that run entirely at rank 0 (Not-containing subtrees
//! and Or subtrees the rewriter chose not to multiply out) into
//! stack-machine form: And becomes `AndTree`, Or becomes `OrTree`, Not
//! stays `Not`, and a row leaf becomes a bare `LoadRow`.

use crate::plan::compile_node::CompileNode;
use crate::plan::row_match::RowMatchNode;

pub fn compile(node: &RowMatchNode) -> CompileNode {
    match node {
        RowMatchNode::And(left, right) => CompileNode::AndTree {
            left: Box::new(compile(left)),
            right: Box::new(compile(right)),
        },
        RowMatchNode::Or(left, right) => CompileNode::OrTree {
            left: Box::new(compile(left)),
            right: Box::new(compile(right)),
        },
        RowMatchNode::Not(child) => CompileNode::Not {
            child: Box::new(compile(child)),
        },
        RowMatchNode::Row(row) => CompileNode::LoadRow { row: *row },
        RowMatchNode::Report(_) => {
            panic!("Report node inside a rank-zero subtree")
        }
    }
}
