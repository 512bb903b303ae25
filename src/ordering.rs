//! Static declaration-order heuristic over the branch structure of a CFG.
//!
//! Variables that jointly decide control flow should sit close together in
//! the region variable order, or the shared formula fans out. The
//! [`PartitionOrderer`] derives such an order from the control-flow graph:
//! for every two-way branch it computes which edges are reachable on exactly
//! one side of the branch, and records a dependency from the branch's
//! partition to each such edge's partition. A pre-order walk of the
//! resulting dependency graph yields the partition order.
//!
//! All traversals use explicit worklists; the output is deterministic for
//! identical input.

use std::collections::{HashMap, HashSet};

use log::debug;
use num_bigint::BigInt;

/// Opaque key of a variable equivalence class assigned by the external
/// classifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

/// Usage pattern of a partition; drives width selection and compression.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Used only as a truth value.
    Boolean,
    /// Compared only for (in)equality.
    IntEqual,
    /// General arithmetic.
    IntAdd,
}

/// Classifier output for one partition.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub id: PartitionId,
    pub kind: PartitionKind,
    /// Distinct literals the partition's variables are compared against;
    /// feeds the compressed codepoint table.
    pub literals: Vec<BigInt>,
    /// Number of distinct variables in the partition.
    pub var_count: usize,
}

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone)]
struct OrderingEdge {
    #[allow(dead_code)]
    from: NodeId,
    to: NodeId,
    partition: Option<PartitionId>,
}

#[derive(Debug, Clone)]
struct BranchPoint {
    true_edge: EdgeId,
    false_edge: EdgeId,
    partition: Option<PartitionId>,
}

/// Control-flow graph restricted to what the orderer needs: directed edges
/// carrying optional partition ids, and two-way branch records.
#[derive(Debug, Default)]
pub struct OrderingCfg {
    edges: Vec<OrderingEdge>,
    out_edges: HashMap<NodeId, Vec<EdgeId>>,
    branches: Vec<BranchPoint>,
    branch_nodes: HashSet<NodeId>,
}

impl OrderingCfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, partition: Option<PartitionId>) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(OrderingEdge { from, to, partition });
        self.out_edges.entry(from).or_default().push(id);
        id
    }

    /// Register a two-way branch at `node`. The two edges must start there.
    pub fn add_branch(
        &mut self,
        node: NodeId,
        true_edge: EdgeId,
        false_edge: EdgeId,
        partition: Option<PartitionId>,
    ) {
        assert_eq!(self.edges[true_edge].from, node, "true edge must leave the branch node");
        assert_eq!(self.edges[false_edge].from, node, "false edge must leave the branch node");
        self.branches.push(BranchPoint {
            true_edge,
            false_edge,
            partition,
        });
        self.branch_nodes.insert(node);
    }

    /// Edges reachable from `start_edge` without crossing another branch
    /// point: the traversal collects the edge into a nested branch but does
    /// not expand that branch's successors.
    fn side_edges(&self, start_edge: EdgeId) -> HashSet<EdgeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![start_edge];
        while let Some(edge) = stack.pop() {
            if !seen.insert(edge) {
                continue;
            }
            let target = self.edges[edge].to;
            if self.branch_nodes.contains(&target) {
                continue;
            }
            if let Some(outs) = self.out_edges.get(&target) {
                stack.extend(outs.iter().copied());
            }
        }
        seen
    }

    /// Partitions in first-appearance order (branches, then edges).
    fn all_partitions(&self) -> Vec<PartitionId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let branch_parts = self.branches.iter().filter_map(|b| b.partition);
        let edge_parts = self.edges.iter().filter_map(|e| e.partition);
        for p in branch_parts.chain(edge_parts) {
            if seen.insert(p) {
                out.push(p);
            }
        }
        out
    }
}

/// Computes a partition declaration order from branch structure.
pub struct PartitionOrderer;

impl PartitionOrderer {
    /// Derive the ordered partition list for `cfg`.
    ///
    /// Partitions never touched by any branch dependency come first, in
    /// first-appearance order; then, for every dependency key in insertion
    /// order, a pre-order collection of the key and its transitive
    /// dependencies, skipping partitions already placed.
    pub fn compute_order(cfg: &OrderingCfg) -> Vec<PartitionId> {
        let mut dep_keys: Vec<PartitionId> = Vec::new();
        let mut deps: HashMap<PartitionId, Vec<PartitionId>> = HashMap::new();
        let mut touched: HashSet<PartitionId> = HashSet::new();

        for branch in &cfg.branches {
            let Some(branch_partition) = branch.partition else {
                continue;
            };
            let true_side = cfg.side_edges(branch.true_edge);
            let false_side = cfg.side_edges(branch.false_edge);

            // Edges reachable on exactly one side are the ones this branch
            // distinguishes.
            let mut distinguished: Vec<EdgeId> = true_side
                .symmetric_difference(&false_side)
                .copied()
                .collect();
            distinguished.sort_unstable();

            for edge in distinguished {
                let Some(edge_partition) = cfg.edges[edge].partition else {
                    continue;
                };
                debug!(
                    "branch partition {:?} distinguishes edge {} (partition {:?})",
                    branch_partition, edge, edge_partition
                );
                touched.insert(branch_partition);
                touched.insert(edge_partition);
                let entry = deps.entry(branch_partition).or_insert_with(|| {
                    dep_keys.push(branch_partition);
                    Vec::new()
                });
                if !entry.contains(&edge_partition) {
                    entry.push(edge_partition);
                }
            }
        }

        let mut order: Vec<PartitionId> = Vec::new();
        let mut collected: HashSet<PartitionId> = HashSet::new();

        // Partitions outside the dependency graph go first.
        for p in cfg.all_partitions() {
            if !touched.contains(&p) && collected.insert(p) {
                order.push(p);
            }
        }

        // Pre-order walk of each key and its transitive dependencies.
        for &key in &dep_keys {
            let mut stack = vec![key];
            while let Some(p) = stack.pop() {
                if !collected.insert(p) {
                    continue;
                }
                order.push(p);
                if let Some(children) = deps.get(&p) {
                    // Reversed so the first dependency is visited first.
                    stack.extend(children.iter().rev().copied());
                }
            }
        }

        debug!("partition order = {:?}", order);
        order
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const A: PartitionId = PartitionId(1);
    const B: PartitionId = PartitionId(2);
    const C: PartitionId = PartitionId(3);
    const D: PartitionId = PartitionId(4);
    const E: PartitionId = PartitionId(5);
    const F: PartitionId = PartitionId(6);
    const G: PartitionId = PartitionId(7);

    /// Diamond: one branch over C whose sides carry A and B.
    fn diamond() -> OrderingCfg {
        let mut cfg = OrderingCfg::new();
        let e0 = cfg.add_edge(0, 1, None);
        let e1 = cfg.add_edge(0, 2, None);
        let _e2 = cfg.add_edge(1, 3, Some(A));
        let _e3 = cfg.add_edge(2, 3, Some(B));
        cfg.add_branch(0, e0, e1, Some(C));
        cfg
    }

    #[test]
    fn test_diamond_order() {
        let order = PartitionOrderer::compute_order(&diamond());
        // The branch partition clusters with what it distinguishes.
        assert_eq!(order, vec![C, A, B]);
    }

    #[test]
    fn test_untouched_first() {
        let mut cfg = diamond();
        // A straight-line edge whose partition no branch distinguishes.
        cfg.add_edge(3, 4, Some(G));
        let order = PartitionOrderer::compute_order(&cfg);
        assert_eq!(order, vec![G, C, A, B]);
    }

    #[test]
    fn test_nested_branch_bounds_traversal() {
        let mut cfg = OrderingCfg::new();
        // Outer branch at node 0 (partition C); node 1 is an inner branch
        // (partition F) reached on the true side.
        let e0 = cfg.add_edge(0, 1, None);
        let e1 = cfg.add_edge(0, 2, None);
        let e2 = cfg.add_edge(1, 3, Some(D));
        let e3 = cfg.add_edge(1, 4, None);
        let _e4 = cfg.add_edge(2, 5, Some(E));
        cfg.add_branch(0, e0, e1, Some(C));
        cfg.add_branch(1, e2, e3, Some(F));

        let order = PartitionOrderer::compute_order(&cfg);
        // The outer traversal stops at node 1, so D belongs to F, not C.
        assert_eq!(order, vec![C, E, F, D]);
    }

    #[test]
    fn test_shared_tail_not_distinguished() {
        let mut cfg = OrderingCfg::new();
        let e0 = cfg.add_edge(0, 1, None);
        let e1 = cfg.add_edge(0, 2, None);
        let _e2 = cfg.add_edge(1, 3, Some(A));
        let _e3 = cfg.add_edge(2, 3, Some(B));
        // Both sides reach node 3 and continue over the same edge.
        let _e4 = cfg.add_edge(3, 4, Some(G));
        cfg.add_branch(0, e0, e1, Some(C));

        let order = PartitionOrderer::compute_order(&cfg);
        // G is reachable on both sides: not distinguished, so it stays
        // outside the dependency graph and is placed first.
        assert_eq!(order, vec![G, C, A, B]);
    }

    #[test]
    fn test_deterministic() {
        let mut cfg = diamond();
        cfg.add_edge(3, 4, Some(G));
        let first = PartitionOrderer::compute_order(&cfg);
        for _ in 0..10 {
            let mut cfg = diamond();
            cfg.add_edge(3, 4, Some(G));
            assert_eq!(PartitionOrderer::compute_order(&cfg), first);
        }
    }

    #[test]
    fn test_branch_without_partition_is_skipped() {
        let mut cfg = OrderingCfg::new();
        let e0 = cfg.add_edge(0, 1, Some(A));
        let e1 = cfg.add_edge(0, 2, Some(B));
        cfg.add_branch(0, e0, e1, None);
        // No dependencies recorded; both partitions are untouched.
        assert_eq!(PartitionOrderer::compute_order(&cfg), vec![A, B]);
    }
}
