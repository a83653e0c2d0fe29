//! End-to-end queries over the synthetic corpus
//!
//! Documents 1..=832 where document n contains `p<k>` for every k
//! dividing n. All counts below are exact because every indexed term owns
//! private rows; verification must report zero false negatives and zero
//! false positives.

use bitsieve::{
    prime_factors_index, verify_one_query, verify_synthetic, DiagnosticStream, IndexConfig,
    QueryEngine, QueryInstrumentation, ResultsBuffer, SimpleIndex, StreamConfiguration, Term,
    TermTable,
};

use std::sync::OnceLock;

static INDEX: OnceLock<SimpleIndex> = OnceLock::new();

fn index() -> &'static SimpleIndex {
    INDEX.get_or_init(|| prime_factors_index(832))
}

fn engine(index: &SimpleIndex) -> QueryEngine<'_> {
    QueryEngine::new(index, StreamConfiguration::new())
        .with_diagnostic_stream(DiagnosticStream::to_sink())
}

fn verified_matches(query: &str) -> Vec<u64> {
    let index = index();
    let mut engine = engine(index);
    let verifier = verify_one_query(&mut engine, index, query).unwrap();
    assert_eq!(
        verifier.false_negative_count(),
        0,
        "false negatives for '{}': {:?}",
        query,
        verifier.false_negatives()
    );
    assert_eq!(
        verifier.false_positive_count(),
        0,
        "false positives for '{}': {:?}",
        query,
        verifier.false_positives()
    );
    verifier.true_positives().to_vec()
}

#[test]
fn single_term_match() {
    let matches = verified_matches("p7");
    assert_eq!(matches.len(), 118);
    assert_eq!(matches[0], 7);
    assert_eq!(matches[117], 826);
    assert!(matches.iter().all(|id| id % 7 == 0));
}

#[test]
fn and_of_two_terms() {
    // p6 p35 is conceptually p2 & p3 & p5 & p7.
    let matches = verified_matches("p6 p35");
    assert_eq!(matches, vec![210, 420, 630]);
}

#[test]
fn or_of_two_terms() {
    let matches = verified_matches("p3|p5");
    assert_eq!(matches.len(), 388); // 277 + 166 - 55
    assert!(matches.iter().all(|id| id % 3 == 0 || id % 5 == 0));
}

#[test]
fn not_excludes_divisors() {
    let matches = verified_matches("p2 -p3");
    assert_eq!(matches.len(), 278); // 416 - 138
    assert!(matches.iter().all(|id| id % 2 == 0 && id % 3 != 0));
}

#[test]
fn grouped_boolean_combinations() {
    let matches = verified_matches("(p2|p3) p5");
    let expected = (1..=832u64)
        .filter(|id| (id % 2 == 0 || id % 3 == 0) && id % 5 == 0)
        .count();
    assert_eq!(matches.len(), expected);

    let matches = verified_matches("p2 (p3|-p5)");
    let expected = (1..=832u64)
        .filter(|id| id % 2 == 0 && (id % 3 == 0 || id % 5 != 0))
        .count();
    assert_eq!(matches.len(), expected);
}

#[test]
fn phrase_of_adjacent_divisors() {
    // Divisor tokens are emitted in ascending order, so "p1 p2" is a
    // token run exactly in the even documents.
    let matches = verified_matches("\"p1 p2\"");
    assert_eq!(matches.len(), 416);
}

#[test]
fn synthetic_sweep_has_no_false_negatives() {
    let index = index();
    let mut engine = engine(index);
    let report = verify_synthetic(&mut engine, index, 832).unwrap();
    assert_eq!(report.term_count, 145);
    assert_eq!(report.false_negatives, 0);
    assert_eq!(report.false_positives, 0);
    assert!(report.expected_matches > 0);
    assert!(report.signal_to_noise().is_infinite());
}

// ============================================================================
// Boundary cases
// ============================================================================

/// A small corpus with the ad-hoc fallback disabled, so unknown terms
/// have an empty row set.
fn strict_index() -> SimpleIndex {
    let mut index = SimpleIndex::new(IndexConfig {
        slice_capacity: 64,
        adhoc_row_count: 0,
        term_ranks: vec![0, 0],
        ..IndexConfig::default()
    });
    for id in 1..=40u64 {
        let tokens = (1..=id).filter(|k| id % k == 0).map(|k| format!("p{}", k));
        index.ingest(id, vec![(0, tokens.collect())]).unwrap();
    }
    index.seal().unwrap();
    index
}

#[test]
fn empty_row_set_matches_nothing() {
    let index = strict_index();
    let mut engine = engine(&index);
    let tree = engine.parse("unseen").unwrap();
    let mut instrumentation = QueryInstrumentation::new();
    let mut results = ResultsBuffer::new(64);
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    assert!(results.is_empty());

    // AND'ed with a real term it still kills the conjunction.
    let tree = engine.parse("p2 unseen").unwrap();
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    assert!(results.is_empty());
}

#[test]
fn all_ones_row_matches_every_document() {
    let mut index = SimpleIndex::new(IndexConfig {
        slice_capacity: 64,
        adhoc_row_count: 0,
        term_ranks: vec![0, 0],
        ..IndexConfig::default()
    });
    for id in 1..=40u64 {
        index.ingest(id, vec![(0, vec!["filler".to_string()])]).unwrap();
    }
    // Alias a term onto the document-active row, which is all ones for
    // live columns.
    let everywhere = Term::new("everywhere", 0);
    let active = index.term_table().document_active_row();
    index.term_table_mut().map_term(everywhere, vec![active]).unwrap();
    index.seal().unwrap();

    let mut engine = engine(&index);
    let tree = engine.parse("everywhere").unwrap();
    let mut instrumentation = QueryInstrumentation::new();
    let mut results = ResultsBuffer::new(64);
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    assert_eq!(results.len(), 40);
}

#[test]
fn not_of_all_zeros_row_matches_every_document() {
    let mut index = SimpleIndex::new(IndexConfig {
        slice_capacity: 64,
        adhoc_row_count: 0,
        term_ranks: vec![0, 0],
        ..IndexConfig::default()
    });
    for id in 1..=40u64 {
        index.ingest(id, vec![(0, vec!["filler".to_string()])]).unwrap();
    }
    // Alias a term onto the match-none row: all zeros, never set.
    let nothing = Term::new("nothing", 0);
    let none_row = index.term_table().match_none_row();
    index.term_table_mut().map_term(nothing, vec![none_row]).unwrap();
    index.seal().unwrap();

    let mut engine = engine(&index);

    let tree = engine.parse("nothing").unwrap();
    let mut instrumentation = QueryInstrumentation::new();
    let mut results = ResultsBuffer::new(64);
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    assert!(results.is_empty());

    let tree = engine.parse("-nothing").unwrap();
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    // Vacant columns of the slice stay excluded by the active row.
    assert_eq!(results.len(), 40);
}

#[test]
fn fact_queries_match_asserted_documents() {
    let mut index = SimpleIndex::new(IndexConfig {
        slice_capacity: 64,
        adhoc_row_count: 0,
        term_ranks: vec![0, 0],
        ..IndexConfig::default()
    });
    for id in 1..=20u64 {
        index.ingest(id, vec![(0, vec![format!("t{}", id)])]).unwrap();
    }
    index.assert_fact(4, "chosen").unwrap();
    index.assert_fact(9, "chosen").unwrap();
    index.seal().unwrap();

    let mut engine = engine(&index);
    // Fact queries have no query-text surface; build the tree directly.
    let tree = bitsieve::TermMatchNode::Fact {
        name: "chosen".to_string(),
    };
    let mut instrumentation = QueryInstrumentation::new();
    let mut results = ResultsBuffer::new(64);
    engine.run(&tree, &mut instrumentation, &mut results).unwrap();
    let mut ids: Vec<u64> = results
        .iter()
        .map(|m| index.doc_id(m.slice, m.index).unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![4, 9]);
}

#[test]
fn adhoc_terms_still_evaluate() {
    // With the fallback enabled an unknown term synthesizes rows instead
    // of matching nothing; collisions with real rows may produce false
    // positives but never false negatives.
    let index = index();
    let mut engine = engine(index);
    let verifier = verify_one_query(&mut engine, index, "p2 zebra").unwrap();
    assert_eq!(verifier.expected().len(), 0);
    assert_eq!(verifier.false_negative_count(), 0);
}
