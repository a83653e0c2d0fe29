//! Term table
//!
//! Maps a term to the ordered list of rows it occupies. The matching core
//! only reads a sealed table through the [`TermTable`] trait; the
//! [`SimpleTermTable`] here is the in-memory reference used by the engine's
//! tests and the synthetic indexes.
//!
//! Terms the table has never seen do not match nothing: they fall back to
//! a pseudo-random row selection seeded by the term hash, so unseen terms
//! still evaluate (with a high false-positive rate). Disabling the ad-hoc
//! fallback (`adhoc_row_count == 0`) makes unknown terms yield an empty
//! sequence instead.

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::index::row_id::{Rank, RowId, ShardId, MAX_RANK};
use crate::index::term::Term;
use crate::util::mix64;

// ============================================================================
// RowIdSequence
// ============================================================================

/// The ordered, finite set of rows a term occupies. Two to six rows per
/// term is typical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowIdSequence {
    rows: Vec<RowId>,
}

impl RowIdSequence {
    pub fn new(mut rows: Vec<RowId>) -> Self {
        rows.sort();
        rows.dedup();
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowId> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }
}

impl<'a> IntoIterator for &'a RowIdSequence {
    type Item = &'a RowId;
    type IntoIter = std::slice::Iter<'a, RowId>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ============================================================================
// TermTable trait
// ============================================================================

/// Read-only term lookup consumed by the planner.
pub trait TermTable {
    /// Rows for a term. Never empty for a sealed table unless the ad-hoc
    /// fallback is disabled.
    fn rows_for_term(&self, term: &Term) -> RowIdSequence;

    /// Rows for a named fact. Unknown facts yield an empty sequence.
    fn rows_for_fact(&self, name: &str) -> RowIdSequence;

    /// The rank-0 row whose bit is set for every live document. Plans AND
    /// this row in at the root so vacant slice columns never match.
    fn document_active_row(&self) -> RowId;

    /// The rank-0 row that is never set. Terms with an empty row set
    /// compile to this row so they match nothing.
    fn match_none_row(&self) -> RowId;

    /// Largest n-gram the index materialises; phrase plans window their
    /// tokens to this size.
    fn max_gram_size(&self) -> usize;
}

// ============================================================================
// SimpleTermTable
// ============================================================================

// Reserved rank-0 system rows.
const ROW_DOCUMENT_ACTIVE: usize = 0;
const ROW_MATCH_NONE: usize = 1;
const SYSTEM_ROW_COUNT: usize = 2;

pub struct SimpleTermTable {
    shard: ShardId,
    rows: HashMap<Term, Vec<RowId>>,
    facts: HashMap<String, Vec<RowId>>,
    row_counts: [usize; MAX_RANK + 1],
    adhoc_row_count: usize,
    max_gram_size: usize,
    sealed: bool,
}

impl SimpleTermTable {
    /// An unsealed table for one shard. `adhoc_row_count` is the number of
    /// rank-0 rows synthesized per unknown term (0 disables the fallback);
    /// `max_gram_size` is the largest n-gram the index will materialise.
    pub fn new(shard: ShardId, adhoc_row_count: usize, max_gram_size: usize) -> Self {
        let mut row_counts = [0; MAX_RANK + 1];
        row_counts[0] = SYSTEM_ROW_COUNT;
        Self {
            shard,
            rows: HashMap::new(),
            facts: HashMap::new(),
            row_counts,
            adhoc_row_count,
            max_gram_size: max_gram_size.max(1),
            sealed: false,
        }
    }

    /// Allocate fresh rows for a term, one per entry of `ranks`.
    pub fn add_rows(&mut self, term: Term, ranks: &[Rank]) -> Result<&[RowId]> {
        self.ensure_unsealed()?;
        let shard = self.shard;
        let row_counts = &mut self.row_counts;
        let rows = self.rows.entry(term).or_insert_with(|| {
            ranks
                .iter()
                .map(|&rank| {
                    let index = row_counts[rank];
                    row_counts[rank] += 1;
                    RowId::new(shard, rank, index)
                })
                .collect()
        });
        Ok(rows)
    }

    /// Map a term onto explicit rows, replacing any previous mapping. Used
    /// to alias terms onto system rows or force collisions in tests.
    pub fn map_term(&mut self, term: Term, rows: Vec<RowId>) -> Result<()> {
        self.ensure_unsealed()?;
        self.rows.insert(term, rows);
        Ok(())
    }

    /// Allocate a single rank-0 row for a named fact.
    pub fn add_fact(&mut self, name: &str) -> Result<RowId> {
        self.ensure_unsealed()?;
        let shard = self.shard;
        let row_counts = &mut self.row_counts;
        let rows = self.facts.entry(name.to_string()).or_insert_with(|| {
            let index = row_counts[0];
            row_counts[0] += 1;
            vec![RowId::new(shard, 0, index)]
        });
        Ok(rows[0])
    }

    pub fn is_known(&self, term: &Term) -> bool {
        self.rows.contains_key(term)
    }

    /// Freeze the table. Row counts per rank become the shard's row-table
    /// geometry; lookups after this point never allocate.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn row_count(&self, rank: Rank) -> usize {
        self.row_counts[rank]
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.sealed {
            return Err(Error::with_message(
                ErrorCode::Sealed,
                "term table is sealed",
            ));
        }
        Ok(())
    }

    fn adhoc_rows(&self, term: &Term) -> RowIdSequence {
        let rank0_count = self.row_counts[0];
        if self.adhoc_row_count == 0 || rank0_count <= SYSTEM_ROW_COUNT {
            return RowIdSequence::empty();
        }
        // Draw indices from the non-system region of the rank-0 table,
        // deterministically in the term hash.
        let span = (rank0_count - SYSTEM_ROW_COUNT) as u64;
        let mut value = term.hash();
        let rows = (0..self.adhoc_row_count)
            .map(|_| {
                value = mix64(value);
                let index = SYSTEM_ROW_COUNT + (value % span) as usize;
                RowId::new(self.shard, 0, index)
            })
            .collect();
        RowIdSequence::new(rows)
    }
}

impl TermTable for SimpleTermTable {
    fn rows_for_term(&self, term: &Term) -> RowIdSequence {
        match self.rows.get(term) {
            Some(rows) => RowIdSequence::new(rows.clone()),
            None => self.adhoc_rows(term),
        }
    }

    fn rows_for_fact(&self, name: &str) -> RowIdSequence {
        match self.facts.get(name) {
            Some(rows) => RowIdSequence::new(rows.clone()),
            None => RowIdSequence::empty(),
        }
    }

    fn document_active_row(&self) -> RowId {
        RowId::new(self.shard, 0, ROW_DOCUMENT_ACTIVE)
    }

    fn match_none_row(&self) -> RowId {
        RowId::new(self.shard, 0, ROW_MATCH_NONE)
    }

    fn max_gram_size(&self) -> usize {
        self.max_gram_size
    }
}

// ============================================================================
// Tests
// ============================================================================
