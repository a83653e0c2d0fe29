//! Row match trees
//!
//! After term-to-row conversion a query is a boolean tree over abstract
//! rows. An [`AbstractRow`] carries the row's position in the plan's row
//! table, the rank at which the plan evaluates it, the rank-delta back to
//! its native rank, and its inversion state. [`RowMatchNode`] children are
//! reference counted because the rewriter's cross-product expansion shares
//! subtrees between branches.

use std::rc::Rc;

use crate::error::Result;
use crate::index::row_id::{Rank, MAX_RANK};
use crate::plan::text::TextScanner;

// ============================================================================
// AbstractRow
// ============================================================================

/// A row as the plan sees it. The row's native rank is
/// `rank() + rank_delta()`; when the delta is nonzero the evaluator
/// right-shifts its iteration offset by the delta before indexing into the
/// row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbstractRow {
    id: u16,
    rank: u8,
    rank_delta: u8,
    inverted: bool,
}

impl AbstractRow {
    /// A row evaluated at its native rank.
    pub fn new(id: usize, rank: Rank, inverted: bool) -> Self {
        debug_assert!(id <= u16::MAX as usize, "row id overflow");
        debug_assert!(rank <= MAX_RANK);
        Self {
            id: id as u16,
            rank: rank as u8,
            rank_delta: 0,
            inverted,
        }
    }

    /// Re-rank `row` to be evaluated `rank_delta` ranks below its native
    /// rank. The native rank (rank + delta) is preserved.
    pub fn with_rank_delta(row: AbstractRow, rank_delta: Rank) -> Self {
        let native = row.rank as Rank + row.rank_delta as Rank;
        debug_assert!(rank_delta <= native, "rank delta exceeds native rank");
        Self {
            id: row.id,
            rank: (native - rank_delta) as u8,
            rank_delta: rank_delta as u8,
            inverted: row.inverted,
        }
    }

    /// Full constructor, used by the tree text format.
    pub fn with_parts(id: usize, rank: Rank, rank_delta: Rank, inverted: bool) -> Self {
        debug_assert!(rank + rank_delta <= MAX_RANK, "rank delta overflow");
        Self {
            id: id as u16,
            rank: rank as u8,
            rank_delta: rank_delta as u8,
            inverted,
        }
    }

    /// Position in the plan's row table.
    pub fn id(&self) -> usize {
        self.id as usize
    }

    /// The rank at which the plan evaluates this row.
    pub fn rank(&self) -> Rank {
        self.rank as Rank
    }

    pub fn rank_delta(&self) -> Rank {
        self.rank_delta as Rank
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub(crate) fn parse(scanner: &mut TextScanner) -> Result<AbstractRow> {
        // Row(id, rank, rankDelta, inverted)
        let pos = scanner.position();
        let keyword = scanner.ident()?;
        if keyword != "Row" {
            return Err(crate::error::Error::at(
                crate::error::ErrorCode::Syntax,
                format!("expected 'Row', got '{}'", keyword),
                pos,
            ));
        }
        scanner.expect('(')?;
        let id = scanner.number()?;
        scanner.expect(',')?;
        let rank = scanner.number()?;
        scanner.expect(',')?;
        let delta = scanner.number()?;
        scanner.expect(',')?;
        let inverted = scanner.boolean()?;
        scanner.expect(')')?;
        Ok(AbstractRow::with_parts(id, rank, delta, inverted))
    }
}

impl std::fmt::Display for AbstractRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Row({}, {}, {}, {})",
            self.id, self.rank, self.rank_delta, self.inverted
        )
    }
}

// ============================================================================
// RowMatchNode
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum RowMatchNode {
    Row(AbstractRow),
    And(Rc<RowMatchNode>, Rc<RowMatchNode>),
    Or(Rc<RowMatchNode>, Rc<RowMatchNode>),
    Not(Rc<RowMatchNode>),
    /// Emit a match contribution for the current offset. A non-null child
    /// is a rank-zero subtree AND'ed into the contribution.
    Report(Option<Rc<RowMatchNode>>),
}

impl RowMatchNode {
    pub fn row(row: AbstractRow) -> Rc<RowMatchNode> {
        Rc::new(RowMatchNode::Row(row))
    }

    pub fn and(left: Rc<RowMatchNode>, right: Rc<RowMatchNode>) -> Rc<RowMatchNode> {
        Rc::new(RowMatchNode::And(left, right))
    }

    pub fn or(left: Rc<RowMatchNode>, right: Rc<RowMatchNode>) -> Rc<RowMatchNode> {
        Rc::new(RowMatchNode::Or(left, right))
    }

    pub fn not(child: Rc<RowMatchNode>) -> Rc<RowMatchNode> {
        Rc::new(RowMatchNode::Not(child))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RowMatchNode::Row(_) => "Row",
            RowMatchNode::And(..) => "And",
            RowMatchNode::Or(..) => "Or",
            RowMatchNode::Not(..) => "Not",
            RowMatchNode::Report(_) => "Report",
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
            RowMatchNode::Row(row) => {
                out.push_str(&row.to_string());
            }
            RowMatchNode::And(left, right) | RowMatchNode::Or(left, right) => {
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
            RowMatchNode::Not(child) => {
                out.push_str("Not {\n");
                out.push_str(&format!("{}Child: ", inner));
                child.write(out, indent + 1);
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
            RowMatchNode::Report(child) => {
                out.push_str("Report {\n");
                out.push_str(&format!("{}Child: ", inner));
                if let Some(child) = child {
                    child.write(out, indent + 1);
                }
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
        }
    }

    pub fn parse_text(text: &str) -> Result<Rc<RowMatchNode>> {
        let mut scanner = TextScanner::new(text);
        let node = Self::parse_node(&mut scanner)?;
        scanner.expect_end()?;
        Ok(node)
    }

    fn parse_node(scanner: &mut TextScanner) -> Result<Rc<RowMatchNode>> {
        let pos = scanner.position();
        let name = scanner.ident()?;
        match name.as_str() {
            "Row" => {
                // AbstractRow::parse expects the keyword it just consumed;
                // re-parse the primitive body here.
                scanner.expect('(')?;
                let id = scanner.number()?;
                scanner.expect(',')?;
                let rank = scanner.number()?;
                scanner.expect(',')?;
                let delta = scanner.number()?;
                scanner.expect(',')?;
                let inverted = scanner.boolean()?;
                scanner.expect(')')?;
                Ok(RowMatchNode::row(AbstractRow::with_parts(
                    id, rank, delta, inverted,
                )))
            }
            "And" | "Or" => {
                Self::expect_braced_field(scanner, "Children")?;
                scanner.expect('[')?;
                let left = Self::parse_node(scanner)?;
                scanner.expect(',')?;
                let right = Self::parse_node(scanner)?;
                scanner.expect(']')?;
                scanner.expect('}')?;
                Ok(if name == "And" {
                    RowMatchNode::and(left, right)
                } else {
                    RowMatchNode::or(left, right)
                })
            }
            "Not" => {
                Self::expect_braced_field(scanner, "Child")?;
                let child = Self::parse_node(scanner)?;
                scanner.expect('}')?;
                Ok(RowMatchNode::not(child))
            }
            "Report" => {
                Self::expect_braced_field(scanner, "Child")?;
                let child = if scanner.peek() == Some('}') {
                    None
                } else {
                    Some(Self::parse_node(scanner)?)
                };
                scanner.expect('}')?;
                Ok(Rc::new(RowMatchNode::Report(child)))
            }
            other => Err(crate::error::Error::at(
                crate::error::ErrorCode::Syntax,
                format!("unknown row match node '{}'", other),
                pos,
            )),
        }
    }

    fn expect_braced_field(scanner: &mut TextScanner, field: &str) -> Result<()> {
        scanner.expect('{')?;
        let pos = scanner.position();
        let name = scanner.ident()?;
        if name != field {
            return Err(crate::error::Error::at(
                crate::error::ErrorCode::Syntax,
                format!("expected field '{}', got '{}'", field, name),
                pos,
            ));
        }
        scanner.expect(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_delta_preserves_native_rank() {
        let row = AbstractRow::new(5, 4, false);
        assert_eq!(row.rank(), 4);
        assert_eq!(row.rank_delta(), 0);

        let dropped = AbstractRow::with_rank_delta(row, 3);
        assert_eq!(dropped.rank(), 1);
        assert_eq!(dropped.rank_delta(), 3);
        assert_eq!(dropped.rank() + dropped.rank_delta(), 4);

        // Lifting all the way to rank zero.
        let zeroed = AbstractRow::with_rank_delta(dropped, 4);
        assert_eq!(zeroed.rank(), 0);
        assert_eq!(zeroed.rank_delta(), 4);
    }

    #[test]
    fn test_row_text_round_trip() {
        let row = AbstractRow::with_parts(3, 1, 2, true);
        let text = row.to_string();
        assert_eq!(text, "Row(3, 1, 2, true)");
        let mut scanner = TextScanner::new(&text);
        assert_eq!(AbstractRow::parse(&mut scanner).unwrap(), row);
    }

    #[test]
    fn test_tree_text_round_trip() {
        let tree = RowMatchNode::and(
            RowMatchNode::row(AbstractRow::new(0, 3, false)),
            Rc::new(RowMatchNode::Report(Some(RowMatchNode::not(
                RowMatchNode::or(
                    RowMatchNode::row(AbstractRow::with_parts(1, 0, 3, false)),
                    RowMatchNode::row(AbstractRow::new(2, 0, true)),
                ),
            )))),
        );
        let text = tree.format();
        assert_eq!(RowMatchNode::parse_text(&text).unwrap(), tree);
    }

    #[test]
    fn test_parse_report_without_child() {
        let tree = RowMatchNode::parse_text("Report {\n  Child: \n}").unwrap();
        assert_eq!(*tree, RowMatchNode::Report(None));
    }
}
