//! Cycle search over directed graphs.
//!
//! Used for both the flow dependency graph (checked once, at construction)
//! and the device wait-for graph (checked periodically at runtime).

use std::collections::{BTreeMap, BTreeSet};

/// Directed graph as an adjacency map. Nodes without an entry have no out-edges.
pub type Adjacency<N> = BTreeMap<N, BTreeSet<N>>;

/// Find the first cycle reachable in `graph`.
///
/// Depth-first search with an explicit stack, visiting roots and successors
/// in key order so the result is deterministic. The returned path starts and
/// ends at the same node: `[a, b, c, a]`.
pub fn find_cycle<N: Ord + Clone>(graph: &Adjacency<N>) -> Option<Vec<N>> {
    let mut visited: BTreeSet<&N> = BTreeSet::new();

    for root in graph.keys() {
        if !visited.insert(root) {
            continue;
        }

        let mut path: Vec<&N> = vec![root];
        let mut on_path: BTreeSet<&N> = BTreeSet::from([root]);
        let mut stack = vec![successors(graph, root)];

        while let Some(frontier) = stack.last_mut() {
            match frontier.next() {
                Some(next) if on_path.contains(next) => {
                    let start = path.iter().position(|node| *node == next)?;
                    let mut cycle: Vec<N> = path[start..].iter().map(|n| (*n).clone()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Some(next) => {
                    if visited.insert(next) {
                        path.push(next);
                        on_path.insert(next);
                        stack.push(successors(graph, next));
                    }
                }
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(done);
                    }
                }
            }
        }
    }

    None
}

fn successors<'a, N: Ord>(graph: &'a Adjacency<N>, node: &N) -> impl Iterator<Item = &'a N> {
    graph.get(node).into_iter().flatten()
}
