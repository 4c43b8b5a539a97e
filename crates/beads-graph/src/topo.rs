//! Topological ordering over `blocks` edges.

use std::collections::BinaryHeap;

use beads_core::enums::DependencyType;

use crate::GraphSnapshot;

/// Kahn's algorithm over `blocks` edges only, with a stable tie-break:
/// priority asc, then created_at asc, then id asc.
///
/// Edges point from the dependent to its blocker, so blockers sort first.
/// Nodes caught in a cycle never reach in-degree zero and are omitted;
/// callers that need cycle detection use [`crate::cycle::verify_acyclic`].
pub fn topological_order(snapshot: &GraphSnapshot) -> Vec<usize> {
    let n = snapshot.len();
    let mut in_degree = vec![0usize; n];
    // dependents[b] lists nodes that wait on b.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (src, dst, dep_type) in &snapshot.edges {
        if *dep_type == DependencyType::Blocks {
            in_degree[*src] += 1;
            dependents[*dst].push(*src);
        }
    }

    // Max-heap on reversed keys yields min-first ordering.
    let mut heap: BinaryHeap<std::cmp::Reverse<OrderKey>> = BinaryHeap::new();
    for idx in 0..n {
        if in_degree[idx] == 0 {
            heap.push(std::cmp::Reverse(OrderKey::new(snapshot, idx)));
        }
    }

    let mut order = Vec::with_capacity(n);
    while let Some(std::cmp::Reverse(key)) = heap.pop() {
        let idx = key.idx;
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                heap.push(std::cmp::Reverse(OrderKey::new(snapshot, dependent)));
            }
        }
    }
    order
}

/// Sort key: priority asc, created_at asc, id asc.
#[derive(PartialEq, Eq)]
struct OrderKey {
    priority: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    id: String,
    idx: usize,
}

impl OrderKey {
    fn new(snapshot: &GraphSnapshot, idx: usize) -> Self {
        let issue = snapshot.issue(idx);
        Self {
            priority: issue.priority,
            created_at: issue.created_at,
            id: issue.id.clone(),
            idx,
        }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.created_at.cmp(&other.created_at))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
