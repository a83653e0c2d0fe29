//! Simple in-memory index
//!
//! The matching core runs against any shard/term-table pair; this module
//! supplies the single-shard, in-memory implementation used by the engine
//! tests and the synthetic verification corpus. Ingestion is two-phase:
//! documents accumulate in the document cache while the term table grows,
//! then [`SimpleIndex::seal`] freezes the table, lays out the shard's row
//! tables, and replays every document into row bits. Row tables are
//! immutable after seal.

use lazy_static::lazy_static;
use log::debug;

use crate::error::{Error, ErrorCode, Result};
use crate::index::row_id::{Rank, ShardId, MAX_RANK};
use crate::index::shard::{slice_shard, RamShard, Shard, SliceId};
use crate::index::term::{StreamId, Term};
use crate::index::term_table::{SimpleTermTable, TermTable};
use crate::index::token::TokenManager;
use crate::index::{DocId, DocIndex};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Documents per slice. Power of two, 64..=4096.
    pub slice_capacity: usize,
    /// Rank-0 rows synthesized per unknown term; 0 disables the ad-hoc
    /// fallback so unknown terms match nothing.
    pub adhoc_row_count: usize,
    /// Largest n-gram materialised at ingestion.
    pub max_gram_size: usize,
    /// Ranks of the rows allocated to each indexed term, e.g. two rank-0
    /// rows and one rank-3 row.
    pub term_ranks: Vec<Rank>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            slice_capacity: 512,
            adhoc_row_count: 3,
            max_gram_size: 2,
            term_ranks: vec![0, 0, 3],
        }
    }
}

// ============================================================================
// Document cache
// ============================================================================

/// A cached document: the ground truth the match verifier evaluates
/// against.
#[derive(Clone, Debug)]
pub struct Document {
    id: DocId,
    streams: Vec<(StreamId, Vec<String>)>,
    facts: Vec<String>,
}

impl Document {
    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn streams(&self) -> &[(StreamId, Vec<String>)] {
        &self.streams
    }

    pub fn contains_term(&self, stream: StreamId, text: &str) -> bool {
        self.streams
            .iter()
            .filter(|(s, _)| *s == stream)
            .any(|(_, tokens)| tokens.iter().any(|t| t == text))
    }

    /// True when `grams` occurs as a consecutive token run in `stream`.
    pub fn contains_phrase(&self, stream: StreamId, grams: &[String]) -> bool {
        if grams.is_empty() {
            return false;
        }
        self.streams
            .iter()
            .filter(|(s, _)| *s == stream)
            .any(|(_, tokens)| {
                tokens.len() >= grams.len()
                    && tokens.windows(grams.len()).any(|window| window == grams)
            })
    }

    pub fn has_fact(&self, name: &str) -> bool {
        self.facts.iter().any(|f| f == name)
    }
}

// ============================================================================
// SimpleIndex
// ============================================================================

const SHARD_ID: ShardId = 0;

pub struct SimpleIndex {
    config: IndexConfig,
    term_table: SimpleTermTable,
    shard: Option<RamShard>,
    tokens: TokenManager,
    documents: Vec<Document>,
}

impl SimpleIndex {
    pub fn new(config: IndexConfig) -> Self {
        let term_table =
            SimpleTermTable::new(SHARD_ID, config.adhoc_row_count, config.max_gram_size);
        Self {
            config,
            term_table,
            shard: None,
            tokens: TokenManager::new(),
            documents: Vec::new(),
        }
    }

    /// Add a document to the cache and register its vocabulary. Row bits
    /// are not written until [`seal`](Self::seal).
    pub fn ingest(&mut self, id: DocId, streams: Vec<(StreamId, Vec<String>)>) -> Result<()> {
        if self.shard.is_some() {
            return Err(Error::with_message(ErrorCode::Sealed, "index is sealed"));
        }
        for (stream, tokens) in &streams {
            for token in tokens {
                self.term_table
                    .add_rows(Term::new(token, *stream), &self.config.term_ranks.clone())?;
            }
            for size in 2..=self.config.max_gram_size.min(tokens.len()) {
                for window in tokens.windows(size) {
                    self.term_table
                        .add_rows(Term::gram(window, *stream), &self.config.term_ranks.clone())?;
                }
            }
        }
        self.documents.push(Document {
            id,
            streams,
            facts: Vec::new(),
        });
        Ok(())
    }

    /// Attach a named fact to an already-ingested document.
    pub fn assert_fact(&mut self, id: DocId, name: &str) -> Result<()> {
        if self.shard.is_some() {
            return Err(Error::with_message(ErrorCode::Sealed, "index is sealed"));
        }
        self.term_table.add_fact(name)?;
        let doc = self
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| {
                Error::with_message(ErrorCode::UnknownDocument, format!("no document {}", id))
            })?;
        doc.facts.push(name.to_string());
        Ok(())
    }

    /// Seal the term table, lay out the shard, and replay the document
    /// cache into row bits.
    pub fn seal(&mut self) -> Result<()> {
        if self.shard.is_some() {
            return Err(Error::with_message(
                ErrorCode::Sealed,
                "index is already sealed",
            ));
        }
        self.term_table.seal();

        let mut row_counts = [0usize; MAX_RANK + 1];
        for (rank, count) in row_counts.iter_mut().enumerate() {
            *count = self.term_table.row_count(rank);
        }
        let mut shard = RamShard::new(SHARD_ID, self.config.slice_capacity, row_counts);

        for doc in &self.documents {
            let mut rows = vec![self.term_table.document_active_row()];
            for (stream, tokens) in &doc.streams {
                for token in tokens {
                    rows.extend(
                        self.term_table
                            .rows_for_term(&Term::new(token, *stream))
                            .iter()
                            .copied(),
                    );
                }
                for size in 2..=self.config.max_gram_size.min(tokens.len()) {
                    for window in tokens.windows(size) {
                        rows.extend(
                            self.term_table
                                .rows_for_term(&Term::gram(window, *stream))
                                .iter()
                                .copied(),
                        );
                    }
                }
            }
            for fact in &doc.facts {
                rows.extend(self.term_table.rows_for_fact(fact).iter().copied());
            }
            shard.ingest(doc.id, rows);
        }

        debug!(
            "sealed index: {} documents, {} slices, {} rank-0 rows",
            self.documents.len(),
            shard.slices().len(),
            self.term_table.row_count(0)
        );
        self.shard = Some(shard);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.shard.is_some()
    }

    pub fn term_table(&self) -> &SimpleTermTable {
        &self.term_table
    }

    /// Explicit term/row control for boundary tests; forwards to the term
    /// table while the index is unsealed.
    pub fn term_table_mut(&mut self) -> &mut SimpleTermTable {
        &mut self.term_table
    }

    pub fn shard_count(&self) -> usize {
        1
    }

    pub fn shard(&self, id: ShardId) -> &dyn Shard {
        assert_eq!(id, SHARD_ID, "unknown shard {}", id);
        self.shard.as_ref().expect("index not sealed")
    }

    /// Mutable shard access for interpreter scenarios that poke exact row
    /// patterns after seal.
    pub fn shard_mut(&mut self) -> &mut RamShard {
        self.shard.as_mut().expect("index not sealed")
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Resolve a match handle back to the caller's document id.
    pub fn doc_id(&self, slice: SliceId, index: DocIndex) -> Result<DocId> {
        let shard_id = slice_shard(slice);
        if shard_id != SHARD_ID {
            return Err(Error::with_message(
                ErrorCode::UnknownDocument,
                format!("slice {} belongs to unknown shard {}", slice, shard_id),
            ));
        }
        self.shard
            .as_ref()
            .expect("index not sealed")
            .doc_id(slice, index)
            .ok_or_else(|| {
                Error::with_message(
                    ErrorCode::UnknownDocument,
                    format!("no document at slice {} index {}", slice, index),
                )
            })
    }
}

// ============================================================================
// Synthetic prime-factors corpus
// ============================================================================

lazy_static! {
    // Sieve of Eratosthenes covering the largest legal slice capacity.
    static ref SMALL_PRIMES: Vec<u64> = {
        const LIMIT: usize = 4096;
        let mut composite = vec![false; LIMIT + 1];
        let mut primes = Vec::new();
        for n in 2..=LIMIT {
            if !composite[n] {
                primes.push(n as u64);
                let mut multiple = n * n;
                while multiple <= LIMIT {
                    composite[multiple] = true;
                    multiple += n;
                }
            }
        }
        primes
    };
}

/// Primes up to and including `limit` (limit <= 4096).
pub fn primes_below(limit: u64) -> &'static [u64] {
    assert!(limit <= 4096, "prime table covers 2..=4096");
    let end = SMALL_PRIMES.partition_point(|&p| p <= limit);
    &SMALL_PRIMES[..end]
}

/// Build the synthetic corpus: documents 1..=`max_doc` where document n
/// contains the term `p<k>` for every k dividing n. Composite divisors get
/// terms too, so `p6 p35` evaluates like `p2 & p3 & p5 & p7`.
pub fn prime_factors_index(max_doc: DocId) -> SimpleIndex {
    let mut index = SimpleIndex::new(IndexConfig::default());
    for id in 1..=max_doc {
        let tokens: Vec<String> = (1..=id)
            .filter(|k| id % k == 0)
            .map(|k| format!("p{}", k))
            .collect();
        index
            .ingest(id, vec![(0, tokens)])
            .expect("ingest before seal");
    }
    index.seal().expect("seal once");
    index
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primes_below() {
        assert_eq!(primes_below(10), &[2, 3, 5, 7]);
        assert_eq!(primes_below(11), &[2, 3, 5, 7, 11]);
        assert_eq!(primes_below(1), &[] as &[u64]);
        assert_eq!(primes_below(832).len(), 145);
    }

    #[test]
    fn test_prime_factors_corpus_shape() {
        let index = prime_factors_index(832);
        assert!(index.is_sealed());
        assert_eq!(index.document_count(), 832);
        // 832 documents at 512 per slice.
        assert_eq!(index.shard(0).slices().len(), 2);

        let doc = &index.documents()[209]; // document id 210 = 2*3*5*7
        assert_eq!(doc.id(), 210);
        assert!(doc.contains_term(0, "p2"));
        assert!(doc.contains_term(0, "p7"));
        assert!(!doc.contains_term(0, "p11"));
    }

    #[test]
    fn test_phrase_ground_truth() {
        let index = prime_factors_index(100);
        let doc = &index.documents()[5]; // document id 6: tokens [p2, p3]
        assert!(doc.contains_phrase(0, &["p2".to_string(), "p3".to_string()]));
        assert!(!doc.contains_phrase(0, &["p3".to_string(), "p2".to_string()]));
    }

    #[test]
    fn test_ingest_after_seal_fails() {
        let mut index = prime_factors_index(10);
        let err = index.ingest(11, vec![(0, vec!["p11".to_string()])]);
        assert_eq!(err.unwrap_err().code(), ErrorCode::Sealed);
    }

    #[test]
    fn test_doc_id_resolution() {
        let index = prime_factors_index(832);
        let shard = index.shard(0);
        let slice = shard.slices()[1].id();
        // Document 513 is the first column of the second slice.
        assert_eq!(index.doc_id(slice, 0).unwrap(), 513);
        assert!(index.doc_id(slice, 400).is_err());
    }

    #[test]
    fn test_facts_attach_to_documents() {
        let mut index = SimpleIndex::new(IndexConfig::default());
        index.ingest(1, vec![(0, vec!["alpha".to_string()])]).unwrap();
        index.assert_fact(1, "verified").unwrap();
        assert!(index.assert_fact(9, "verified").is_err());
        index.seal().unwrap();
        assert!(index.documents()[0].has_fact("verified"));
        assert!(!index.documents()[0].has_fact("other"));
    }
}
