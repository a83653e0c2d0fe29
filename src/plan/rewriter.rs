//! Match-tree rewriter
//!
//! Reshapes a row match tree for rank-descending evaluation. The tree is
//! partitioned, level by level, into four buckets: an And-tree of rows
//! with rank above zero, an And-chain of Or subtrees, an And-tree of
//! rank-0 rows, and an "other" tree holding Not subtrees (lifted to rank
//! zero). At each step one Or subtree is popped and cross-producted
//! against the surrounding And context, until either no Or remains, the
//! partition already holds enough rows for the fast rank-down path, or the
//! cross-product budget is exhausted. A partition is materialised by
//! wrapping the leftover buckets in a Report node under the rank-N tree.
//!
//! Rank-up rule: a row whose rank exceeds the partition's parent rank is
//! rewritten to an equivalent row at the parent rank with the difference
//! recorded as rank-delta. A set bit at rank r speaks for all 2^(r-p)
//! constituent bits at rank p, so the substitution only ever
//! over-approximates (or, for inverted rows, under-approximates the
//! cleared bits), which the Report-level verification absorbs.
//!
//! An Or subtree the rewriter declines to expand is lifted to rank zero
//! wholesale. If it contains even one Not it must execute under the
//! Report node; otherwise it stays rank-ladder compatible and is AND'ed
//! alongside.

use std::rc::Rc;

use crate::index::row_id::{Rank, MAX_RANK};
use crate::plan::row_match::{AbstractRow, RowMatchNode};

/// Rewrite `root`, bounding the expansion with the two targets: stop
/// multiplying out Or subtrees once a partition holds `target_row_count`
/// rows, or once `target_cross_product_terms` terms have been generated.
pub fn rewrite(
    root: &Rc<RowMatchNode>,
    target_row_count: usize,
    target_cross_product_terms: usize,
) -> Rc<RowMatchNode> {
    let mut cross_product_terms = 0;
    build(
        &Partition::empty(),
        root,
        target_row_count,
        target_cross_product_terms,
        &mut cross_product_terms,
    )
}

fn build(
    parent: &Partition,
    node: &Rc<RowMatchNode>,
    target_row_count: usize,
    target_cross_product_terms: usize,
    cross_product_terms: &mut usize,
) -> Rc<RowMatchNode> {
    let mut partition = Partition::descend(parent, node);

    // The recursion halts and the partition is materialised when:
    // 1. no Or subtree remains to form cross products with;
    // 2. the partition already meets the row target, after which matches
    //    are sparse enough for the slower rank-zero machinery;
    // 3. the cross-product term budget is spent (a full cross product is
    //    exponential in the number of factors).
    if partition.or_tree.is_none()
        || partition.row_count > target_row_count
        || *cross_product_terms >= target_cross_product_terms
    {
        *cross_product_terms += 1;
        partition.create_tree()
    } else {
        let rank_n_tree = partition.rank_n_tree.take();
        let (or_left, or_right) = partition.pop_from_or_tree();

        let left = build(
            &partition,
            &or_left,
            target_row_count,
            target_cross_product_terms,
            cross_product_terms,
        );
        let right = build(
            &partition,
            &or_right,
            target_row_count,
            target_cross_product_terms,
            cross_product_terms,
        );
        let or_node = RowMatchNode::or(left, right);

        match rank_n_tree {
            Some(tree) => RowMatchNode::and(tree, or_node),
            None => or_node,
        }
    }
}

// ============================================================================
// Partition
// ============================================================================

struct Partition {
    row_count: usize,
    parent_rank: Rank,
    min_rank: Rank,
    rank_n_tree: Option<Rc<RowMatchNode>>,
    or_tree: Option<Rc<RowMatchNode>>,
    rank0_tree: Option<Rc<RowMatchNode>>,
    other_tree: Option<Rc<RowMatchNode>>,
}

impl Partition {
    fn empty() -> Self {
        Self {
            row_count: 0,
            parent_rank: MAX_RANK,
            min_rank: MAX_RANK,
            rank_n_tree: None,
            or_tree: None,
            rank0_tree: None,
            other_tree: None,
        }
    }

    /// Extend `parent` with the contents of `node`.
    fn descend(parent: &Partition, node: &Rc<RowMatchNode>) -> Self {
        let mut partition = Self {
            row_count: parent.row_count,
            parent_rank: parent.min_rank,
            min_rank: parent.min_rank,
            rank_n_tree: parent.rank_n_tree.clone(),
            or_tree: parent.or_tree.clone(),
            rank0_tree: parent.rank0_tree.clone(),
            other_tree: parent.other_tree.clone(),
        };
        let mut rows: [Option<Rc<RowMatchNode>>; MAX_RANK + 1] = Default::default();
        partition.process_tree(node, &mut rows);

        let rank0 = rows[0].take();
        add_node(&mut partition.rank0_tree, rank0);
        for bucket in rows.iter_mut().skip(1) {
            add_node(&mut partition.rank_n_tree, bucket.take());
        }
        partition
    }

    fn process_tree(
        &mut self,
        node: &Rc<RowMatchNode>,
        rows: &mut [Option<Rc<RowMatchNode>>; MAX_RANK + 1],
    ) {
        match &**node {
            RowMatchNode::And(left, right) => {
                self.process_tree(left, rows);
                self.process_tree(right, rows);
            }
            RowMatchNode::Not(_) => {
                // The whole Not subtree executes at rank zero under the
                // Report node.
                let (lifted, _) = rank_up_to_zero(node);
                add_node(&mut self.other_tree, Some(lifted));
            }
            RowMatchNode::Or(..) => {
                add_node(&mut self.or_tree, Some(Rc::clone(node)));
            }
            RowMatchNode::Row(row) => {
                self.row_count += 1;
                let rank = row.rank();
                if rank > 0 && rank < self.min_rank {
                    self.min_rank = rank;
                }
                if rank > self.parent_rank {
                    let adjusted = AbstractRow::with_rank_delta(*row, rank - self.parent_rank);
                    add_node(&mut rows[rank], Some(RowMatchNode::row(adjusted)));
                } else {
                    add_node(&mut rows[rank], Some(Rc::clone(node)));
                }
            }
            RowMatchNode::Report(_) => {
                panic!("Report node in rewriter input")
            }
        }
    }

    fn pop_from_or_tree(&mut self) -> (Rc<RowMatchNode>, Rc<RowMatchNode>) {
        let tree = self.or_tree.take().expect("partition has no Or tree");
        match &*tree {
            RowMatchNode::And(left, rest) => {
                self.or_tree = Some(Rc::clone(rest));
                match &**left {
                    RowMatchNode::Or(a, b) => (Rc::clone(a), Rc::clone(b)),
                    _ => panic!("Or-tree chain holds a non-Or head"),
                }
            }
            RowMatchNode::Or(a, b) => (Rc::clone(a), Rc::clone(b)),
            _ => panic!("Or-tree is neither Or nor And chain"),
        }
    }

    /// Materialise the partition as a tree. The "other" bucket and any
    /// unexpanded Or subtree run under the Report node at rank zero; the
    /// rank-0 and rank-N buckets stay on the rank-down ladder.
    fn create_tree(&self) -> Rc<RowMatchNode> {
        let mut tree: Option<Rc<RowMatchNode>> = None;

        if let Some(or_tree) = &self.or_tree {
            // The rewrite terminated early with Or subtrees left over;
            // their rows may sit at any mix of ranks, so lift them all to
            // rank zero.
            let (lifted, contains_not) = rank_up_to_zero(or_tree);
            if contains_not || self.other_tree.is_some() {
                // A Not inside the Or forces the whole Or under the
                // Report node. The same holds whenever an "other" tree
                // exists: the rank-down compiler gives an Or on the
                // ladder a fresh context, which would orphan a Report
                // sitting to its right.
                add_node(&mut tree, self.other_tree.clone());
                add_node(&mut tree, Some(lifted));
                tree = Some(Rc::new(RowMatchNode::Report(tree.take())));
            } else {
                tree = Some(Rc::new(RowMatchNode::Report(None)));
                add_node(&mut tree, Some(lifted));
            }
        } else {
            tree = Some(Rc::new(RowMatchNode::Report(self.other_tree.clone())));
        }

        add_node(&mut tree, self.rank0_tree.clone());
        add_node(&mut tree, self.rank_n_tree.clone());

        tree.expect("partition produced no tree")
    }
}

/// `tree = And(node, tree)`, treating an absent tree as identity.
fn add_node(tree: &mut Option<Rc<RowMatchNode>>, node: Option<Rc<RowMatchNode>>) {
    if let Some(node) = node {
        *tree = Some(match tree.take() {
            None => node,
            Some(existing) => RowMatchNode::and(node, existing),
        });
    }
}

/// Rewrite every row in `node` to evaluate at rank zero with its native
/// rank recorded as rank-delta. Reports whether the subtree contains a
/// Not node.
fn rank_up_to_zero(node: &Rc<RowMatchNode>) -> (Rc<RowMatchNode>, bool) {
    match &**node {
        RowMatchNode::And(left, right) => {
            let (l, l_not) = rank_up_to_zero(left);
            let (r, r_not) = rank_up_to_zero(right);
            (RowMatchNode::and(l, r), l_not || r_not)
        }
        RowMatchNode::Or(left, right) => {
            let (l, l_not) = rank_up_to_zero(left);
            let (r, r_not) = rank_up_to_zero(right);
            (RowMatchNode::or(l, r), l_not || r_not)
        }
        RowMatchNode::Not(child) => {
            let (c, _) = rank_up_to_zero(child);
            (RowMatchNode::not(c), true)
        }
        RowMatchNode::Row(row) => {
            let native = row.rank() + row.rank_delta();
            if native > 0 {
                (
                    RowMatchNode::row(AbstractRow::with_rank_delta(*row, native)),
                    false,
                )
            } else {
                (Rc::clone(node), false)
            }
        }
        RowMatchNode::Report(_) => panic!("Report node in rewriter input"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: usize, rank: Rank) -> Rc<RowMatchNode> {
        RowMatchNode::row(AbstractRow::new(id, rank, false))
    }

    /// Count Report nodes, which equals the number of cross-product terms
    /// the rewrite produced.
    fn report_count(node: &RowMatchNode) -> usize {
        match node {
            RowMatchNode::And(l, r) | RowMatchNode::Or(l, r) => {
                report_count(l) + report_count(r)
            }
            RowMatchNode::Not(c) => report_count(c),
            RowMatchNode::Row(_) => 0,
            RowMatchNode::Report(child) => {
                1 + child.as_ref().map_or(0, |c| report_count(c))
            }
        }
    }

    fn max_native_rank(node: &RowMatchNode) -> Rank {
        match node {
            RowMatchNode::And(l, r) | RowMatchNode::Or(l, r) => {
                max_native_rank(l).max(max_native_rank(r))
            }
            RowMatchNode::Not(c) => max_native_rank(c),
            RowMatchNode::Report(child) => child.as_ref().map_or(0, |c| max_native_rank(c)),
            RowMatchNode::Row(row) => row.rank() + row.rank_delta(),
        }
    }

    #[test]
    fn test_plain_and_gets_single_report() {
        let tree = RowMatchNode::and(row(0, 3), RowMatchNode::and(row(1, 0), row(2, 0)));
        let rewritten = rewrite(&tree, 500, 100);
        assert_eq!(report_count(&rewritten), 1);
        // Native ranks survive the rewrite.
        assert_eq!(max_native_rank(&rewritten), 3);
    }

    #[test]
    fn test_or_multiplies_out() {
        // And(r0, Or(r1, r2)) expands to two cross-product terms.
        let tree = RowMatchNode::and(row(0, 3), RowMatchNode::or(row(1, 3), row(2, 3)));
        let rewritten = rewrite(&tree, 500, 100);
        assert_eq!(report_count(&rewritten), 2);
        match &*rewritten {
            RowMatchNode::And(left, or_node) => {
                assert!(matches!(&**left, RowMatchNode::Row(_)));
                assert!(matches!(&**or_node, RowMatchNode::Or(..)));
            }
            other => panic!("expected And(rankN, Or), got {:?}", other),
        }
    }

    #[test]
    fn test_cross_product_budget_stops_expansion() {
        // Three stacked Or factors would give 8 terms; a budget of 1
        // leaves the Or subtrees for the rank-zero machinery.
        let tree = RowMatchNode::and(
            RowMatchNode::or(row(0, 1), row(1, 1)),
            RowMatchNode::and(
                RowMatchNode::or(row(2, 1), row(3, 1)),
                RowMatchNode::or(row(4, 1), row(5, 1)),
            ),
        );
        let expanded = rewrite(&tree, 500, 100);
        assert_eq!(report_count(&expanded), 8);

        let bounded = rewrite(&tree, 500, 1);
        assert!(report_count(&bounded) < 8);
    }

    #[test]
    fn test_row_target_stops_expansion() {
        let tree = RowMatchNode::and(
            RowMatchNode::and(row(0, 1), RowMatchNode::and(row(1, 1), row(2, 1))),
            RowMatchNode::or(row(3, 1), row(4, 1)),
        );
        // Row target already met by the three And rows: no expansion.
        let rewritten = rewrite(&tree, 2, 100);
        assert_eq!(report_count(&rewritten), 1);
    }

    #[test]
    fn test_not_lifts_to_rank_zero_under_report() {
        let tree = RowMatchNode::and(row(0, 0), RowMatchNode::not(row(1, 3)));
        let rewritten = rewrite(&tree, 500, 100);

        // Find the Report node; its child must hold the Not with the row
        // lifted to evaluation rank 0, delta 3.
        fn find_report(node: &RowMatchNode) -> Option<&RowMatchNode> {
            match node {
                RowMatchNode::Report(child) => child.as_deref(),
                RowMatchNode::And(l, r) | RowMatchNode::Or(l, r) => {
                    find_report(l).or_else(|| find_report(r))
                }
                _ => None,
            }
        }
        let report_child = find_report(&rewritten).expect("report with child");
        match report_child {
            RowMatchNode::Not(inner) => match &**inner {
                RowMatchNode::Row(row) => {
                    assert_eq!(row.rank(), 0);
                    assert_eq!(row.rank_delta(), 3);
                }
                other => panic!("expected lifted row, got {:?}", other),
            },
            other => panic!("expected Not under Report, got {:?}", other),
        }
    }

    #[test]
    fn test_rank_up_rule_on_descending_violation() {
        // A rank-6 row under a partition whose parent rank is 3 (set by
        // the min nonzero rank seen at the outer level) is rewritten to
        // rank 3 with delta 3.
        let tree = RowMatchNode::and(
            row(0, 3),
            RowMatchNode::or(RowMatchNode::and(row(1, 6), row(2, 0)), row(3, 0)),
        );
        let rewritten = rewrite(&tree, 500, 100);

        fn find_delta_row(node: &RowMatchNode) -> Option<AbstractRow> {
            match node {
                RowMatchNode::Row(row) if row.rank_delta() > 0 => Some(*row),
                RowMatchNode::And(l, r) | RowMatchNode::Or(l, r) => {
                    find_delta_row(l).or_else(|| find_delta_row(r))
                }
                RowMatchNode::Not(c) => find_delta_row(c),
                RowMatchNode::Report(c) => c.as_deref().and_then(find_delta_row),
                RowMatchNode::Row(_) => None,
            }
        }
        let adjusted = find_delta_row(&rewritten).expect("rank-adjusted row");
        assert_eq!(adjusted.id(), 1);
        assert_eq!(adjusted.rank(), 3);
        assert_eq!(adjusted.rank_delta(), 3);
    }
}
