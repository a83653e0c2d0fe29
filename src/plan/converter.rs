//! Term-to-row conversion
//!
//! Walks a term match tree, replaces each leaf with the AND of the rows
//! its term occupies, and collects the plan's row table: the ordered set
//! of physical rows the generated code will touch, addressed by the
//! abstract ids embedded in [`AbstractRow`]s.
//!
//! Every plan is AND'ed with the document-active row at the root so the
//! vacant columns of a partially filled slice can never match. A term
//! whose row sequence comes back empty maps to the match-none row and so
//! matches nothing.

use std::rc::Rc;

use crate::error::{Error, ErrorCode, Result};
use crate::index::row_id::RowId;
use crate::index::shard::Shard;
use crate::index::term::Term;
use crate::index::term_table::{RowIdSequence, TermTable};
use crate::plan::row_match::{AbstractRow, RowMatchNode};
use crate::plan::term_match::TermMatchNode;

// The bytecode instruction's row field is 10 bits.
const MAX_PLAN_ROWS: usize = 1 << 10;

// ============================================================================
// RowSet
// ============================================================================

/// The plan's row table: abstract id -> physical row.
#[derive(Clone, Debug, Default)]
pub struct RowSet {
    rows: Vec<RowId>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    pub fn row(&self, id: usize) -> RowId {
        self.rows[id]
    }

    /// Word offsets of every plan row within `shard`'s slice buffers,
    /// indexed by abstract id.
    pub fn row_offsets(&self, shard: &dyn Shard) -> Vec<usize> {
        self.rows.iter().map(|&row| shard.row_offset(row)).collect()
    }

    fn add(&mut self, row: RowId) -> Result<usize> {
        if let Some(id) = self.rows.iter().position(|&r| r == row) {
            return Ok(id);
        }
        if self.rows.len() >= MAX_PLAN_ROWS {
            return Err(Error::with_message(
                ErrorCode::Capacity,
                format!("plan exceeds {} rows", MAX_PLAN_ROWS),
            ));
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert `tree` into a row match tree plus its row set.
pub fn convert(
    tree: &TermMatchNode,
    term_table: &dyn TermTable,
) -> Result<(Rc<RowMatchNode>, RowSet)> {
    let mut converter = Converter {
        term_table,
        row_set: RowSet::default(),
    };
    let converted = converter.convert_node(tree)?;
    let active = converter.row_node(term_table.document_active_row())?;
    let root = RowMatchNode::and(active, converted);
    Ok((root, converter.row_set))
}

struct Converter<'a> {
    term_table: &'a dyn TermTable,
    row_set: RowSet,
}

impl<'a> Converter<'a> {
    fn convert_node(&mut self, node: &TermMatchNode) -> Result<Rc<RowMatchNode>> {
        match node {
            TermMatchNode::And(left, right) => Ok(RowMatchNode::and(
                self.convert_node(left)?,
                self.convert_node(right)?,
            )),
            TermMatchNode::Or(left, right) => Ok(RowMatchNode::or(
                self.convert_node(left)?,
                self.convert_node(right)?,
            )),
            TermMatchNode::Not(child) => Ok(RowMatchNode::not(self.convert_node(child)?)),
            TermMatchNode::Unigram { text, stream } => {
                let rows = self.term_table.rows_for_term(&Term::new(text, *stream));
                self.rows_to_tree(&rows)
            }
            TermMatchNode::Phrase { grams, stream } => {
                // A phrase is the AND of its constituent unigrams and of
                // every materialised n-gram window. Strictly an
                // over-approximation of adjacency; verification discards
                // the misses.
                let mut rows: Vec<RowId> = Vec::new();
                for gram in grams {
                    rows.extend(
                        self.term_table
                            .rows_for_term(&Term::new(gram, *stream))
                            .iter()
                            .copied(),
                    );
                }
                let window = self.term_table.max_gram_size().min(grams.len());
                if window >= 2 {
                    for chunk in grams.windows(window) {
                        rows.extend(
                            self.term_table
                                .rows_for_term(&Term::gram(chunk, *stream))
                                .iter()
                                .copied(),
                        );
                    }
                }
                self.rows_to_tree(&RowIdSequence::new(rows))
            }
            TermMatchNode::Fact { name } => {
                let rows = self.term_table.rows_for_fact(name);
                self.rows_to_tree(&rows)
            }
        }
    }

    fn rows_to_tree(&mut self, rows: &RowIdSequence) -> Result<Rc<RowMatchNode>> {
        if rows.is_empty() {
            return self.row_node(self.term_table.match_none_row());
        }
        let mut nodes = Vec::with_capacity(rows.len());
        for &row in rows {
            nodes.push(self.row_node(row)?);
        }
        let mut iter = nodes.into_iter().rev();
        let mut tree = iter.next().expect("at least one row");
        for node in iter {
            tree = RowMatchNode::and(node, tree);
        }
        Ok(tree)
    }

    fn row_node(&mut self, row: RowId) -> Result<Rc<RowMatchNode>> {
        let id = self.row_set.add(row)?;
        Ok(RowMatchNode::row(AbstractRow::new(id, row.rank(), false)))
    }
}

// ============================================================================
// Tests
// ============================================================================
