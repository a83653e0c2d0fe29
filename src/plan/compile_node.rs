//! Compile trees
//!
//! The intermediate representation between the rewritten match tree and a
//! generated program. The first five variants form the rank-down matching
//! skeleton; the last four are the stack-machine shapes the rank-zero
//! compiler emits for subtrees that run at rank 0.
//!
//! [`CompileNode::compile`] lowers a tree through the [`CodeGenerator`]
//! trait. Any backend implementing the trait (the bytecode generator here,
//! or a native emitter) gets identical semantics because all structure is
//! resolved at lowering time.

use crate::error::{Error, ErrorCode, Result};
use crate::index::row_id::Rank;
use crate::plan::row_match::AbstractRow;
use crate::plan::text::TextScanner;

/// Handle for a forward branch target. Allocated before the jump that
/// references it, placed exactly once.
pub type Label = usize;

// ============================================================================
// CodeGenerator
// ============================================================================

/// The instruction surface a compile tree lowers onto.
pub trait CodeGenerator {
    // Rank-down primitives.
    fn and_row(&mut self, row: usize, inverted: bool, rank_delta: Rank);
    fn load_row(&mut self, row: usize, inverted: bool, rank_delta: Rank);

    fn left_shift_offset(&mut self, shift: Rank);
    fn right_shift_offset(&mut self, shift: Rank);
    fn increment_offset(&mut self);

    fn push(&mut self);
    fn pop(&mut self);

    // Stack-machine primitives.
    fn and_stack(&mut self);
    fn constant(&mut self, value: u64);
    fn not(&mut self);
    fn or_stack(&mut self);
    fn update_flags(&mut self);

    fn report(&mut self);

    // Control flow primitives.
    fn allocate_label(&mut self) -> Label;
    fn place_label(&mut self, label: Label);
    fn call(&mut self, label: Label);
    fn jmp(&mut self, label: Label);
    fn jnz(&mut self, label: Label);
    fn jz(&mut self, label: Label);
    fn ret(&mut self);
}

// ============================================================================
// CompileNode
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum CompileNode {
    /// Fetch a row quadword into the accumulator; skip the subtree when it
    /// comes up zero.
    LoadRowJz {
        row: AbstractRow,
        child: Box<CompileNode>,
    },
    /// AND a row quadword into the accumulator; skip the subtree when the
    /// result is zero.
    AndRowJz {
        row: AbstractRow,
        child: Box<CompileNode>,
    },
    /// Evaluate both branches against the same offset; each branch reports
    /// its own matches and dedupe merges them.
    Or {
        left: Box<CompileNode>,
        right: Box<CompileNode>,
    },
    /// Drop `delta` ranks by running the subtree 2^delta times with
    /// consecutive sub-offsets.
    RankDown {
        delta: Rank,
        child: Box<CompileNode>,
    },
    /// Emit a match contribution for the current offset, AND'ing in the
    /// optional rank-zero subtree first.
    Report { child: Option<Box<CompileNode>> },

    /// Stack-machine AND at rank 0.
    AndTree {
        left: Box<CompileNode>,
        right: Box<CompileNode>,
    },
    /// Stack-machine OR at rank 0.
    OrTree {
        left: Box<CompileNode>,
        right: Box<CompileNode>,
    },
    /// Complement the accumulator.
    Not { child: Box<CompileNode> },
    /// Fetch a row quadword into the accumulator.
    LoadRow { row: AbstractRow },
}

impl CompileNode {
    pub fn type_name(&self) -> &'static str {
        match self {
            CompileNode::LoadRowJz { .. } => "LoadRowJz",
            CompileNode::AndRowJz { .. } => "AndRowJz",
            CompileNode::Or { .. } => "Or",
            CompileNode::RankDown { .. } => "RankDown",
            CompileNode::Report { .. } => "Report",
            CompileNode::AndTree { .. } => "AndTree",
            CompileNode::OrTree { .. } => "OrTree",
            CompileNode::Not { .. } => "Not",
            CompileNode::LoadRow { .. } => "LoadRow",
        }
    }

    // ------------------------------------------------------------------
    // Lowering
    // ------------------------------------------------------------------

    pub fn compile(&self, code: &mut dyn CodeGenerator) {
        match self {
            CompileNode::LoadRowJz { row, child } => {
                code.load_row(row.id(), row.inverted(), row.rank_delta());
                let label = code.allocate_label();
                code.jz(label);
                child.compile(code);
                code.place_label(label);
            }
            CompileNode::AndRowJz { row, child } => {
                code.and_row(row.id(), row.inverted(), row.rank_delta());
                let label = code.allocate_label();
                code.jz(label);
                child.compile(code);
                code.place_label(label);
            }
            CompileNode::Or { left, right } => {
                // Both branches see the accumulator as it was on entry;
                // each reports against the same offset.
                code.push();
                left.compile(code);
                code.pop();
                right.compile(code);
            }
            CompileNode::RankDown { delta, child } => {
                code.left_shift_offset(*delta);
                let body = code.allocate_label();
                let iterations = (1usize << delta) - 1;
                for _ in 0..iterations {
                    code.push();
                    code.call(body);
                    code.pop();
                    code.increment_offset();
                }
                code.call(body);
                let done = code.allocate_label();
                code.jmp(done);
                code.place_label(body);
                child.compile(code);
                code.ret();
                code.place_label(done);
                code.right_shift_offset(*delta);
            }
            CompileNode::Report { child } => match child {
                None => code.report(),
                Some(child) => {
                    code.push();
                    child.compile(code);
                    code.and_stack();
                    let label = code.allocate_label();
                    code.jz(label);
                    code.report();
                    code.place_label(label);
                }
            },
            CompileNode::AndTree { left, right } => {
                left.compile(code);
                let label = code.allocate_label();
                // The zero flag is not guaranteed to reflect the
                // accumulator after an arbitrary subtree.
                code.update_flags();
                code.jz(label);
                code.push();
                right.compile(code);
                code.and_stack();
                code.place_label(label);
            }
            CompileNode::OrTree { left, right } => {
                left.compile(code);
                code.push();
                right.compile(code);
                code.or_stack();
            }
            CompileNode::Not { child } => {
                child.compile(code);
                code.not();
            }
            CompileNode::LoadRow { row } => {
                code.load_row(row.id(), row.inverted(), row.rank_delta());
            }
        }
    }

    // ------------------------------------------------------------------
    // Text format
    // ------------------------------------------------------------------

    pub fn format(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        let inner = "  ".repeat(indent + 1);
        match self {
            CompileNode::LoadRowJz { row, child } | CompileNode::AndRowJz { row, child } => {
                out.push_str(self.type_name());
                out.push_str(" {\n");
                out.push_str(&format!("{}Row: {},\n", inner, row));
                out.push_str(&format!("{}Child: ", inner));
                child.write(out, indent + 1);
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
            CompileNode::Or { left, right }
            | CompileNode::AndTree { left, right }
            | CompileNode::OrTree { left, right } => {
                out.push_str(self.type_name());
                out.push_str(" {\n");
                out.push_str(&format!("{}Children: [\n", inner));
                let item = "  ".repeat(indent + 2);
                out.push_str(&item);
                left.write(out, indent + 2);
                out.push_str(",\n");
                out.push_str(&item);
                right.write(out, indent + 2);
                out.push('\n');
                out.push_str(&format!("{}]\n", inner));
                out.push_str(&format!("{}}}", pad));
            }
            CompileNode::RankDown { delta, child } => {
                out.push_str("RankDown {\n");
                out.push_str(&format!("{}Delta: {},\n", inner, delta));
                out.push_str(&format!("{}Child: ", inner));
                child.write(out, indent + 1);
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
            CompileNode::Report { child } => {
                out.push_str("Report {\n");
                out.push_str(&format!("{}Child: ", inner));
                if let Some(child) = child {
                    child.write(out, indent + 1);
                }
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
            CompileNode::Not { child } => {
                out.push_str("Not {\n");
                out.push_str(&format!("{}Child: ", inner));
                child.write(out, indent + 1);
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
            CompileNode::LoadRow { row } => {
                out.push_str(&format!(
                    "LoadRow({}, {}, {}, {})",
                    row.id(),
                    row.rank(),
                    row.rank_delta(),
                    row.inverted()
                ));
            }
        }
    }

    pub fn parse(text: &str) -> Result<CompileNode> {
        let mut scanner = TextScanner::new(text);
        let node = Self::parse_node(&mut scanner)?;
        scanner.expect_end()?;
        Ok(node)
    }

    fn parse_node(scanner: &mut TextScanner) -> Result<CompileNode> {
        let pos = scanner.position();
        let name = scanner.ident()?;
        match name.as_str() {
            "LoadRowJz" | "AndRowJz" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Row")?;
                let row = AbstractRow::parse(scanner)?;
                scanner.expect(',')?;
                Self::expect_field(scanner, "Child")?;
                let child = Box::new(Self::parse_node(scanner)?);
                scanner.expect('}')?;
                Ok(if name == "LoadRowJz" {
                    CompileNode::LoadRowJz { row, child }
                } else {
                    CompileNode::AndRowJz { row, child }
                })
            }
            "Or" | "AndTree" | "OrTree" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Children")?;
                scanner.expect('[')?;
                let left = Box::new(Self::parse_node(scanner)?);
                scanner.expect(',')?;
                let right = Box::new(Self::parse_node(scanner)?);
                scanner.expect(']')?;
                scanner.expect('}')?;
                Ok(match name.as_str() {
                    "Or" => CompileNode::Or { left, right },
                    "AndTree" => CompileNode::AndTree { left, right },
                    _ => CompileNode::OrTree { left, right },
                })
            }
            "RankDown" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Delta")?;
                let delta = scanner.number()?;
                scanner.expect(',')?;
                Self::expect_field(scanner, "Child")?;
                let child = Box::new(Self::parse_node(scanner)?);
                scanner.expect('}')?;
                Ok(CompileNode::RankDown { delta, child })
            }
            "Report" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Child")?;
                let child = if scanner.peek() == Some('}') {
                    None
                } else {
                    Some(Box::new(Self::parse_node(scanner)?))
                };
                scanner.expect('}')?;
                Ok(CompileNode::Report { child })
            }
            "Not" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Child")?;
                let child = Box::new(Self::parse_node(scanner)?);
                scanner.expect('}')?;
                Ok(CompileNode::Not { child })
            }
            "LoadRow" => {
                scanner.expect('(')?;
                let id = scanner.number()?;
                scanner.expect(',')?;
                let rank = scanner.number()?;
                scanner.expect(',')?;
                let delta = scanner.number()?;
                scanner.expect(',')?;
                let inverted = scanner.boolean()?;
                scanner.expect(')')?;
                Ok(CompileNode::LoadRow {
                    row: AbstractRow::with_parts(id, rank, delta, inverted),
                })
            }
            other => Err(Error::at(
                ErrorCode::Syntax,
                format!("unknown compile node '{}'", other),
                pos,
            )),
        }
    }

    fn expect_field(scanner: &mut TextScanner, field: &str) -> Result<()> {
        let pos = scanner.position();
        let name = scanner.ident()?;
        if name != field {
            return Err(Error::at(
                ErrorCode::Syntax,
                format!("expected field '{}', got '{}'", field, name),
                pos,
            ));
        }
        scanner.expect(':')
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> CompileNode {
        CompileNode::RankDown {
            delta: 1,
            child: Box::new(CompileNode::LoadRowJz {
                row: AbstractRow::with_parts(0, 0, 0, false),
                child: Box::new(CompileNode::AndRowJz {
                    row: AbstractRow::with_parts(1, 0, 1, true),
                    child: Box::new(CompileNode::Report {
                        child: Some(Box::new(CompileNode::Not {
                            child: Box::new(CompileNode::LoadRow {
                                row: AbstractRow::with_parts(2, 0, 3, false),
                            }),
                        })),
                    }),
                }),
            }),
        }
    }

    #[test]
    fn test_text_round_trip() {
        let tree = sample_tree();
        assert_eq!(CompileNode::parse(&tree.format()).unwrap(), tree);
    }

    #[test]
    fn test_parse_report_with_null_child() {
        let tree = CompileNode::parse(
            "LoadRowJz { Row: Row(0, 0, 0, false), Child: Report { Child: } }",
        )
        .unwrap();
        match tree {
            CompileNode::LoadRowJz { child, .. } => {
                assert_eq!(*child, CompileNode::Report { child: None });
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_stack_tree_round_trip() {
        let tree = CompileNode::OrTree {
            left: Box::new(CompileNode::AndTree {
                left: Box::new(CompileNode::LoadRow {
                    row: AbstractRow::with_parts(0, 0, 0, false),
                }),
                right: Box::new(CompileNode::LoadRow {
                    row: AbstractRow::with_parts(1, 0, 0, true),
                }),
            }),
            right: Box::new(CompileNode::LoadRow {
                row: AbstractRow::with_parts(2, 0, 0, false),
            }),
        };
        assert_eq!(CompileNode::parse(&tree.format()).unwrap(), tree);
    }
}
