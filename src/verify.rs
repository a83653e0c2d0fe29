//! Match verification
//!
//! The ground-truth oracle used by tests: evaluate the parsed tree
//! directly against every cached document's posting set, run the same
//! query through the engine, and diff expected against observed ids. The
//! synthetic sweep drives one query per prime over the prime-factors
//! corpus and accumulates the aggregate false-positive rate.

use std::io::Write;

use log::debug;

use crate::error::Result;
use crate::index::simple_index::{primes_below, Document, SimpleIndex};
use crate::index::DocId;
use crate::matcher::instrumentation::QueryInstrumentation;
use crate::matcher::results::ResultsBuffer;
use crate::plan::term_match::TermMatchNode;
use crate::engine::QueryEngine;

// ============================================================================
// Ground-truth evaluation
// ============================================================================

/// Evaluate a term match tree against one document.
pub fn evaluate(tree: &TermMatchNode, doc: &Document) -> bool {
    match tree {
        TermMatchNode::And(left, right) => evaluate(left, doc) && evaluate(right, doc),
        TermMatchNode::Or(left, right) => evaluate(left, doc) || evaluate(right, doc),
        TermMatchNode::Not(child) => !evaluate(child, doc),
        TermMatchNode::Unigram { text, stream } => doc.contains_term(*stream, text),
        TermMatchNode::Phrase { grams, stream } => doc.contains_phrase(*stream, grams),
        TermMatchNode::Fact { name } => doc.has_fact(name),
    }
}

// ============================================================================
// MatchVerifier
// ============================================================================

#[derive(Debug, Default)]
pub struct MatchVerifier {
    query: String,
    expected: Vec<DocId>,
    observed: Vec<DocId>,
    true_positives: Vec<DocId>,
    false_positives: Vec<DocId>,
    false_negatives: Vec<DocId>,
}

impl MatchVerifier {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn add_expected(&mut self, id: DocId) {
        self.expected.push(id);
    }

    pub fn add_observed(&mut self, id: DocId) {
        self.observed.push(id);
    }

    /// Diff expected against observed. Both sides are sorted; the merge
    /// classifies every id as true positive, false positive, or false
    /// negative.
    pub fn verify(&mut self) {
        self.expected.sort_unstable();
        self.observed.sort_unstable();

        let mut e = 0;
        let mut o = 0;
        while e < self.expected.len() && o < self.observed.len() {
            let expected = self.expected[e];
            let observed = self.observed[o];
            if expected < observed {
                self.false_negatives.push(expected);
                e += 1;
            } else if expected > observed {
                self.false_positives.push(observed);
                o += 1;
            } else {
                self.true_positives.push(expected);
                e += 1;
                o += 1;
            }
        }
        self.false_positives.extend(&self.observed[o..]);
        self.false_negatives.extend(&self.expected[e..]);
    }

    pub fn expected(&self) -> &[DocId] {
        &self.expected
    }

    pub fn observed(&self) -> &[DocId] {
        &self.observed
    }

    pub fn true_positives(&self) -> &[DocId] {
        &self.true_positives
    }

    pub fn false_positives(&self) -> &[DocId] {
        &self.false_positives
    }

    pub fn false_negatives(&self) -> &[DocId] {
        &self.false_negatives
    }

    pub fn true_positive_count(&self) -> usize {
        self.true_positives.len()
    }

    pub fn false_positive_count(&self) -> usize {
        self.false_positives.len()
    }

    pub fn false_negative_count(&self) -> usize {
        self.false_negatives.len()
    }

    pub fn reset(&mut self) {
        self.expected.clear();
        self.observed.clear();
        self.true_positives.clear();
        self.false_positives.clear();
        self.false_negatives.clear();
    }

    pub fn write_report(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "query: {}", self.query)?;
        writeln!(
            out,
            "true positives: {}, false positives: {}, false negatives: {}",
            self.true_positives.len(),
            self.false_positives.len(),
            self.false_negatives.len()
        )?;
        let total = self.true_positives.len() + self.false_positives.len();
        if total > 0 {
            writeln!(
                out,
                "false positive rate: {:.4}",
                self.false_positives.len() as f64 / total as f64
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// One-query verification
// ============================================================================

/// Parse and run `query`, and diff the engine's matches against direct
/// evaluation over the document cache.
pub fn verify_one_query(
    engine: &mut QueryEngine<'_>,
    index: &SimpleIndex,
    query: &str,
) -> Result<MatchVerifier> {
    let tree = engine.parse(query)?;
    let mut verifier = MatchVerifier::new(query);

    for doc in index.documents() {
        if evaluate(&tree, doc) {
            verifier.add_expected(doc.id());
        }
    }

    let mut instrumentation = QueryInstrumentation::new();
    let mut results = ResultsBuffer::new(index.document_count());
    engine.run(&tree, &mut instrumentation, &mut results)?;

    for m in &results {
        verifier.add_observed(index.doc_id(m.slice, m.index)?);
    }

    verifier.verify();
    debug!(
        "verified '{}': {} tp, {} fp, {} fn",
        query,
        verifier.true_positive_count(),
        verifier.false_positive_count(),
        verifier.false_negative_count()
    );
    Ok(verifier)
}

// ============================================================================
// Synthetic sweep
// ============================================================================

/// Aggregate outcome of the prime-factors sweep.
#[derive(Clone, Debug, Default)]
pub struct SyntheticReport {
    pub term_count: usize,
    pub expected_matches: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl SyntheticReport {
    pub fn false_positive_rate(&self) -> f64 {
        let total = self.true_positives + self.false_positives;
        if total == 0 {
            0.0
        } else {
            self.false_positives as f64 / total as f64
        }
    }

    pub fn signal_to_noise(&self) -> f64 {
        if self.false_positives == 0 {
            f64::INFINITY
        } else {
            self.true_positives as f64 / self.false_positives as f64
        }
    }
}

/// Run `p<k>` for every prime k up to the corpus size and accumulate the
/// verification counts.
pub fn verify_synthetic(
    engine: &mut QueryEngine<'_>,
    index: &SimpleIndex,
    max_doc: DocId,
) -> Result<SyntheticReport> {
    let mut report = SyntheticReport::default();
    for &prime in primes_below(max_doc) {
        let verifier = verify_one_query(engine, index, &format!("p{}", prime))?;
        report.term_count += 1;
        report.expected_matches += verifier.expected().len();
        report.true_positives += verifier.true_positive_count();
        report.false_positives += verifier.false_positive_count();
        report.false_negatives += verifier.false_negative_count();
    }
    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_classification() {
        let mut verifier = MatchVerifier::new("q");
        for id in [1, 2, 3, 5] {
            verifier.add_expected(id);
        }
        for id in [2, 3, 4, 5, 9] {
            verifier.add_observed(id);
        }
        verifier.verify();
        assert_eq!(verifier.true_positives(), &[2, 3, 5]);
        assert_eq!(verifier.false_positives(), &[4, 9]);
        assert_eq!(verifier.false_negatives(), &[1]);
    }

    #[test]
    fn test_diff_handles_unsorted_input() {
        let mut verifier = MatchVerifier::new("q");
        verifier.add_expected(9);
        verifier.add_expected(1);
        verifier.add_observed(1);
        verifier.add_observed(9);
        verifier.verify();
        assert_eq!(verifier.true_positive_count(), 2);
        assert_eq!(verifier.false_positive_count(), 0);
        assert_eq!(verifier.false_negative_count(), 0);
    }

    #[test]
    fn test_report_rates() {
        let report = SyntheticReport {
            term_count: 2,
            expected_matches: 10,
            true_positives: 9,
            false_positives: 1,
            false_negatives: 0,
        };
        assert!((report.false_positive_rate() - 0.1).abs() < 1e-12);
        assert!((report.signal_to_noise() - 9.0).abs() < 1e-12);

        let clean = SyntheticReport::default();
        assert_eq!(clean.false_positive_rate(), 0.0);
        assert!(clean.signal_to_noise().is_infinite());
    }
}
