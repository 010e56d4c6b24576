//! Measures how much structural sharing a set of expression trees carries.
//!
//! The codec writes every occurrence of a shared node in full, so the number of
//! records in a saved model is the *unfolded* node count, not the number of
//! distinct nodes held in memory.

use crate::store::Symbol;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingReport {
    /// Distinct nodes, by identity.
    pub unique_nodes: usize,
    /// Nodes reachable through more than one path.
    pub shared_nodes: usize,
    /// Node count after expanding every shared node at each of its positions.
    /// Saturates at `u64::MAX`.
    pub unfolded_nodes: u64,
}

impl SharingReport {
    pub fn of<'a>(roots: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut graph: DiGraph<&Symbol, ()> = DiGraph::new();
        let mut index: HashMap<*const Symbol, NodeIndex> = HashMap::new();
        let mut root_ids = Vec::new();
        let mut stack: Vec<&Symbol> = Vec::new();

        let mut intern = |graph: &mut DiGraph<&'a Symbol, ()>, node: &'a Symbol| -> (NodeIndex, bool) {
            match index.get(&(node as *const Symbol)) {
                Some(&idx) => (idx, false),
                None => {
                    let idx = graph.add_node(node);
                    index.insert(node as *const Symbol, idx);
                    (idx, true)
                }
            }
        };

        for root in roots {
            let (idx, fresh) = intern(&mut graph, root);
            root_ids.push(idx);
            if fresh {
                stack.push(root);
            }
            while let Some(node) = stack.pop() {
                let (parent, _) = intern(&mut graph, node);
                let linked = node.children.iter().map(|c| c.as_ref()).chain(node.initial_condition().map(|ic| ic.as_ref()));
                for child in linked {
                    let (child_idx, fresh) = intern(&mut graph, child);
                    graph.add_edge(parent, child_idx, ());
                    if fresh {
                        stack.push(child);
                    }
                }
            }
        }

        // Immutable Arc graphs cannot form cycles.
        let order = toposort(&graph, None).unwrap_or_default();
        let mut occurrences = vec![0u64; graph.node_count()];
        for idx in &root_ids {
            occurrences[idx.index()] = occurrences[idx.index()].saturating_add(1);
        }
        for idx in order {
            let count = occurrences[idx.index()];
            for child in graph.neighbors(idx) {
                // `neighbors` yields one entry per edge, so `x * x` counts `x` twice.
                occurrences[child.index()] = occurrences[child.index()].saturating_add(count);
            }
        }

        Self {
            unique_nodes: graph.node_count(),
            shared_nodes: occurrences.iter().filter(|&&n| n > 1).count(),
            unfolded_nodes: occurrences.iter().fold(0u64, |acc, &n| acc.saturating_add(n)),
        }
    }

    /// Unfolded over unique node count; 1.0 means no sharing.
    pub fn duplication_factor(&self) -> f64 {
        if self.unique_nodes == 0 {
            return 1.0;
        }
        self.unfolded_nodes as f64 / self.unique_nodes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tree_without_sharing() {
        let expr = Symbol::add(Symbol::scalar(1.0), Symbol::negate(Symbol::time()));
        let report = SharingReport::of([expr.as_ref()]);
        assert_eq!(report, SharingReport { unique_nodes: 4, shared_nodes: 0, unfolded_nodes: 4 });
        assert_eq!(report.duplication_factor(), 1.0);
    }

    #[test]
    fn test_repeated_child_counts_each_position() {
        let x = Symbol::time();
        let sq = Symbol::multiply(x.clone(), x);
        let report = SharingReport::of([sq.as_ref()]);
        assert_eq!(report.unique_nodes, 2);
        assert_eq!(report.shared_nodes, 1);
        assert_eq!(report.unfolded_nodes, 3);
    }

    #[test]
    fn test_doubling_chain_grows_exponentially() {
        let mut node: Arc<Symbol> = Symbol::scalar(1.0);
        for _ in 0..10 {
            node = Symbol::add(node.clone(), node);
        }
        let report = SharingReport::of([node.as_ref()]);
        assert_eq!(report.unique_nodes, 11);
        assert_eq!(report.unfolded_nodes, (1 << 11) - 1);
    }

    #[test]
    fn test_sharing_across_roots_and_initial_condition() {
        let shared = Symbol::vector(vec![1.0, 2.0]);
        let eti = Symbol::explicit_time_integral(Symbol::time(), shared.clone());
        let other = Symbol::negate(shared.clone());
        let report = SharingReport::of([eti.as_ref(), other.as_ref()]);
        assert_eq!(report.unique_nodes, 4);
        assert_eq!(report.shared_nodes, 1);
        assert_eq!(report.unfolded_nodes, 5);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let mut node: Arc<Symbol> = Symbol::time();
        for _ in 0..80 {
            node = Symbol::add(node.clone(), node);
        }
        assert_eq!(SharingReport::of([node.as_ref()]).unfolded_nodes, u64::MAX);
    }
}
