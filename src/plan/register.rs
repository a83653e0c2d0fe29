//! Register allocator
//!
//! Static analysis for the optional native backend: decide which of the
//! plan's rows deserve dedicated machine registers. A depth-first walk of
//! the compile tree records, per row, the shallowest depth at which it is
//! referenced and the expected number of uses along that path (each
//! `RankDown(d)` multiplies uses by 2^d because its subtree runs 2^d
//! times). Rows sort by (ascending depth, descending uses); the first N
//! used rows receive registers.

use crate::plan::compile_node::CompileNode;
use crate::plan::row_match::AbstractRow;

const NO_ASSOCIATED_ROW: usize = usize::MAX;

#[derive(Clone, Copy, Debug)]
struct Entry {
    id: usize,
    depth: usize,
    uses: u64,
}

impl Entry {
    fn new(id: usize) -> Self {
        Self {
            id,
            depth: NO_ASSOCIATED_ROW,
            uses: 0,
        }
    }

    fn update(&mut self, depth: usize, uses: u64) {
        if depth < self.depth {
            self.depth = depth;
            self.uses = uses;
        } else if depth == self.depth {
            self.uses += uses;
        }
    }

    fn is_used(&self) -> bool {
        self.depth != NO_ASSOCIATED_ROW
    }
}

pub struct RegisterAllocator {
    register_count: usize,
    register_base: usize,
    /// Abstract id -> position in the allocation order.
    mapping: Vec<usize>,
    used: Vec<bool>,
    /// Register ordinal -> abstract id, for the ids that won a register.
    row_ids_by_register: Vec<usize>,
    abstract_rows: Vec<Option<AbstractRow>>,
}

impl RegisterAllocator {
    /// Analyse `root` over a plan of `row_count` rows. Registers
    /// `register_base..register_base + register_count` are available.
    pub fn new(
        root: &CompileNode,
        row_count: usize,
        register_base: usize,
        register_count: usize,
    ) -> Self {
        let mut entries: Vec<Entry> = (0..row_count).map(Entry::new).collect();
        let mut abstract_rows = vec![None; row_count];
        collect_rows(root, 0, 1, &mut entries, &mut abstract_rows);

        entries.sort_by(|a, b| a.depth.cmp(&b.depth).then(b.uses.cmp(&a.uses)));

        let mut mapping = vec![0; row_count];
        let mut used = vec![false; row_count];
        for (position, entry) in entries.iter().enumerate() {
            mapping[entry.id] = position;
            used[entry.id] = entry.is_used();
        }

        let row_ids_by_register = entries
            .iter()
            .take(register_count)
            .take_while(|entry| entry.is_used())
            .map(|entry| entry.id)
            .collect();

        Self {
            register_count,
            register_base,
            mapping,
            used,
            row_ids_by_register,
            abstract_rows,
        }
    }

    /// True when the row with abstract id `id` lives in a register.
    pub fn is_register(&self, id: usize) -> bool {
        self.used[id] && self.mapping[id] < self.register_count
    }

    /// The machine register assigned to `id`. Callers check
    /// [`is_register`](Self::is_register) first.
    pub fn register_for(&self, id: usize) -> usize {
        assert!(self.is_register(id), "row {} has no register", id);
        self.register_base + self.mapping[id]
    }

    pub fn registers_allocated(&self) -> usize {
        self.row_ids_by_register.len()
    }

    pub fn row_id_for_register(&self, register: usize) -> usize {
        self.row_ids_by_register[register]
    }

    /// The abstract row recorded for `id`, when the tree references it.
    pub fn row(&self, id: usize) -> Option<AbstractRow> {
        self.abstract_rows[id]
    }
}

fn collect_rows(
    node: &CompileNode,
    depth: usize,
    uses: u64,
    entries: &mut [Entry],
    abstract_rows: &mut [Option<AbstractRow>],
) {
    match node {
        CompileNode::LoadRowJz { row, child } | CompileNode::AndRowJz { row, child } => {
            entries[row.id()].update(depth, uses);
            abstract_rows[row.id()] = Some(*row);
            collect_rows(child, depth + 1, uses, entries, abstract_rows);
        }
        CompileNode::Or { left, right } => {
            collect_rows(left, depth, uses, entries, abstract_rows);
            collect_rows(right, depth, uses, entries, abstract_rows);
        }
        CompileNode::RankDown { delta, child } => {
            collect_rows(child, depth, uses << delta, entries, abstract_rows);
        }
        CompileNode::Report { child } => {
            if let Some(child) = child {
                collect_rows(child, depth, uses, entries, abstract_rows);
            }
        }
        CompileNode::AndTree { left, right } | CompileNode::OrTree { left, right } => {
            collect_rows(left, depth + 1, uses, entries, abstract_rows);
            collect_rows(right, depth + 1, uses, entries, abstract_rows);
        }
        CompileNode::Not { child } => {
            collect_rows(child, depth, uses, entries, abstract_rows);
        }
        CompileNode::LoadRow { row } => {
            entries[row.id()].update(depth, uses);
            abstract_rows[row.id()] = Some(*row);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::row_match::AbstractRow;

    fn chain(rows: &[(usize, usize)]) -> CompileNode {
        // Build LoadRowJz(r0, AndRowJz(r1, ... Report)).
        let mut node = CompileNode::Report { child: None };
        for (position, &(id, rank)) in rows.iter().enumerate().rev() {
            let row = AbstractRow::new(id, rank, false);
            node = if position == 0 {
                CompileNode::LoadRowJz {
                    row,
                    child: Box::new(node),
                }
            } else {
                CompileNode::AndRowJz {
                    row,
                    child: Box::new(node),
                }
            };
        }
        node
    }

    #[test]
    fn test_shallow_rows_win_registers() {
        let tree = chain(&[(2, 0), (0, 0), (1, 0)]);
        let allocator = RegisterAllocator::new(&tree, 3, 8, 2);
        // Depth order: row 2 (depth 0), row 0 (depth 1), row 1 (depth 2).
        assert!(allocator.is_register(2));
        assert!(allocator.is_register(0));
        assert!(!allocator.is_register(1));
        assert_eq!(allocator.register_for(2), 8);
        assert_eq!(allocator.register_for(0), 9);
        assert_eq!(allocator.registers_allocated(), 2);
        assert_eq!(allocator.row_id_for_register(0), 2);
    }

    #[test]
    fn test_rank_down_multiplies_uses() {
        // Two rows at equal depth; the one under RankDown(2) counts 4 uses
        // and outranks the other.
        let tree = CompileNode::Or {
            left: Box::new(CompileNode::RankDown {
                delta: 2,
                child: Box::new(chain(&[(0, 0)])),
            }),
            right: Box::new(chain(&[(1, 0)])),
        };
        let allocator = RegisterAllocator::new(&tree, 2, 0, 1);
        assert!(allocator.is_register(0));
        assert!(!allocator.is_register(1));
    }

    #[test]
    fn test_unreferenced_rows_are_dropped() {
        let tree = chain(&[(0, 0)]);
        let allocator = RegisterAllocator::new(&tree, 3, 0, 8);
        assert!(allocator.is_register(0));
        assert!(!allocator.is_register(1));
        assert!(!allocator.is_register(2));
        assert_eq!(allocator.registers_allocated(), 1);
        assert_eq!(allocator.row(0), Some(AbstractRow::new(0, 0, false)));
        assert_eq!(allocator.row(1), None);
    }

    #[test]
    fn test_equal_depth_sums_uses() {
        // Row 0 referenced in both Or branches at depth 0: uses 1 + 1.
        let tree = CompileNode::Or {
            left: Box::new(chain(&[(0, 0)])),
            right: Box::new(chain(&[(0, 0)])),
        };
        let allocator = RegisterAllocator::new(&tree, 1, 0, 1);
        assert!(allocator.is_register(0));
    }
}
