//! Readiness computation from a graph snapshot.
//!
//! The storage layer answers readiness from its persistent cache; this
//! module computes the same sets from first principles so the doctor can
//! diff the two and flag drift.

use std::collections::{HashMap, HashSet};

use beads_core::enums::{DependencyType, Status};

use crate::GraphSnapshot;

/// Returns node indices of ready issues: open, not a template, with no
/// unresolved `blocks` predecessor. Ordered priority asc, created_at asc,
/// id asc.
pub fn ready_set(snapshot: &GraphSnapshot) -> Vec<usize> {
    let blocked = blocked_map(snapshot);
    let mut ready: Vec<usize> = (0..snapshot.len())
        .filter(|&idx| {
            let issue = snapshot.issue(idx);
            issue.is_workable() && !blocked.contains_key(&idx)
        })
        .collect();
    ready.sort_by(|&a, &b| {
        let ia = snapshot.issue(a);
        let ib = snapshot.issue(b);
        ia.priority
            .cmp(&ib.priority)
            .then(ia.created_at.cmp(&ib.created_at))
            .then(ia.id.cmp(&ib.id))
    });
    ready
}

/// Maps each blocked open issue to the indices of its unresolved blockers.
///
/// Mirrors the persistent cache invariant: an entry exists iff the issue is
/// open and has at least one unresolved `blocks` predecessor. Blockers that
/// are closed or tombstoned (or missing from the snapshot) are satisfied.
pub fn blocked_map(snapshot: &GraphSnapshot) -> HashMap<usize, HashSet<usize>> {
    let mut map: HashMap<usize, HashSet<usize>> = HashMap::new();
    for (src, dst, dep_type) in &snapshot.edges {
        if *dep_type != DependencyType::Blocks {
            continue;
        }
        let issue = snapshot.issue(*src);
        if issue.status != Status::Open {
            continue;
        }
        let blocker = snapshot.issue(*dst);
        if blocker.status.is_unresolved() {
            map.entry(*src).or_default().insert(*dst);
        }
    }
    map
}

/// Compares a stored `(issue_id, blocker_id)` cache against the snapshot
/// recompute, returning the rows that disagree (missing or stale).
pub fn cache_drift(
    snapshot: &GraphSnapshot,
    stored: &[(String, String)],
) -> Vec<(String, String)> {
    let expected: HashSet<(String, String)> = blocked_map(snapshot)
        .into_iter()
        .flat_map(|(issue, blockers)| {
            let issue_id = snapshot.issue(issue).id.clone();
            blockers
                .into_iter()
                .map(move |b| (issue_id.clone(), snapshot.issue(b).id.clone()))
        })
        .collect();
    let stored_set: HashSet<(String, String)> = stored.iter().cloned().collect();

    let mut drift: Vec<(String, String)> = expected
        .symmetric_difference(&stored_set)
        .cloned()
        .collect();
    drift.sort();
    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::issue::IssueBuilder;

    fn build(issues: Vec<(&str, Status)>, edges: &[(&str, &str)]) -> GraphSnapshot {
        let nodes = issues
            .into_iter()
            .map(|(id, status)| {
                let mut b = IssueBuilder::new(format!("Issue {id}")).id(id).status(status.clone());
                if status == Status::Closed {
                    b = b.closed_at(chrono::Utc::now());
                }
                b.build()
            })
            .collect();
        let deps: Vec<Dependency> = edges
            .iter()
            .map(|(a, b)| Dependency::new(*a, *b, DependencyType::Blocks, ""))
            .collect();
        GraphSnapshot::new(nodes, &deps)
    }

    fn ready_ids(snap: &GraphSnapshot) -> Vec<String> {
        ready_set(snap)
            .into_iter()
            .map(|i| snap.issue(i).id.clone())
            .collect()
    }

    #[test]
    fn open_blocker_blocks() {
        let snap = build(
            vec![("a", Status::Open), ("b", Status::Open)],
            &[("b", "a")],
        );
        assert_eq!(ready_ids(&snap), vec!["a"]);
    }

    #[test]
    fn closed_blocker_releases() {
        let snap = build(
            vec![("a", Status::Closed), ("b", Status::Open)],
            &[("b", "a")],
        );
        assert_eq!(ready_ids(&snap), vec!["b"]);
    }

    #[test]
    fn in_progress_blocker_still_blocks() {
        let snap = build(
            vec![("a", Status::InProgress), ("b", Status::Open)],
            &[("b", "a")],
        );
        assert!(ready_ids(&snap).is_empty());
    }

    #[test]
    fn orphaned_edge_is_satisfied() {
        // Edge to a node outside the snapshot: dropped at construction.
        let nodes = vec![IssueBuilder::new("Issue b").id("b").build()];
        let deps = vec![Dependency::new("b", "gone", DependencyType::Blocks, "")];
        let snap = GraphSnapshot::new(nodes, &deps);
        assert_eq!(ready_ids(&snap), vec!["b"]);
    }

    #[test]
    fn drift_detection() {
        let snap = build(
            vec![("a", Status::Open), ("b", Status::Open)],
            &[("b", "a")],
        );
        // Cache agrees: no drift.
        let stored = vec![("b".to_string(), "a".to_string())];
        assert!(cache_drift(&snap, &stored).is_empty());

        // Cache missing the row.
        assert_eq!(cache_drift(&snap, &[]).len(), 1);

        // Cache holds a stale row.
        let stale = vec![
            ("b".to_string(), "a".to_string()),
            ("x".to_string(), "y".to_string()),
        ];
        assert_eq!(cache_drift(&snap, &stale).len(), 1);
    }
}
