//! Topological ordering (Kahn's algorithm) with deterministic tie-breaks.

use std::collections::{BTreeMap, BTreeSet};

use super::NodeId;

/// Order `nodes` so that every edge `(from, to)` has `from` first.
///
/// When several nodes are ready at once the smallest id goes first, so two
/// graphs with the same topology always produce the same order. Returns
/// `None` if the edges contain a cycle. Edges naming unknown nodes are
/// ignored.
pub fn topological_order(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Option<Vec<NodeId>> {
    let mut in_degree: BTreeMap<NodeId, usize> = nodes.iter().map(|&id| (id, 0)).collect();
    let mut dependents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

    let mut seen = BTreeSet::new();
    for &(from, to) in edges {
        if !in_degree.contains_key(&from) || !in_degree.contains_key(&to) {
            continue;
        }
        // Parallel edges (several ports between the same pair) count once.
        if !seen.insert((from, to)) {
            continue;
        }
        dependents.entry(from).or_default().push(to);
        if let Some(degree) = in_degree.get_mut(&to) {
            *degree += 1;
        }
    }

    let mut ready: BTreeSet<NodeId> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        if let Some(next) = dependents.get(&id) {
            for &dep in next {
                if let Some(degree) = in_degree.get_mut(&dep) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dep);
                    }
                }
            }
        }
    }

    (order.len() == in_degree.len()).then_some(order)
}
