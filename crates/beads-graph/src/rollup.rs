//! Epic rollups over parent-child edges.

use std::collections::{HashSet, VecDeque};

use beads_core::enums::{DependencyType, Status};

use crate::{GraphError, GraphSnapshot};

/// Progress of one epic: closed / total over its parent-child descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub total: usize,
    pub closed: usize,
}

impl Progress {
    /// Completion ratio in [0, 1]; an epic with no children reads as 0.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.closed as f64 / self.total as f64
        }
    }
}

/// Collects all parent-child descendants of an epic, transitively.
pub fn descendants(snapshot: &GraphSnapshot, epic_id: &str) -> Result<Vec<usize>, GraphError> {
    let epic_idx = snapshot
        .node(epic_id)
        .ok_or_else(|| GraphError::UnknownIssue(epic_id.to_string()))?;

    let mut result = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    queue.push_back(epic_idx);
    visited.insert(epic_idx);

    while let Some(parent) = queue.pop_front() {
        for (src, dst, dep_type) in &snapshot.edges {
            if *dst == parent && *dep_type == DependencyType::ParentChild && visited.insert(*src) {
                result.push(*src);
                queue.push_back(*src);
            }
        }
    }
    Ok(result)
}

/// Computes closed/total progress over an epic's descendants.
pub fn progress(snapshot: &GraphSnapshot, epic_id: &str) -> Result<Progress, GraphError> {
    let children = descendants(snapshot, epic_id)?;
    let closed = children
        .iter()
        .filter(|&&idx| snapshot.issue(idx).status == Status::Closed)
        .count();
    Ok(Progress {
        total: children.len(),
        closed,
    })
}

/// The ready subset of an epic's descendants, ordered like the global ready
/// set.
pub fn ready_descendants(snapshot: &GraphSnapshot, epic_id: &str) -> Result<Vec<usize>, GraphError> {
    let children: HashSet<usize> = descendants(snapshot, epic_id)?.into_iter().collect();
    Ok(crate::readiness::ready_set(snapshot)
        .into_iter()
        .filter(|idx| children.contains(idx))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::enums::IssueType;
    use beads_core::issue::IssueBuilder;

    fn epic_snapshot() -> GraphSnapshot {
        let epic = IssueBuilder::new("Epic")
            .id("epic")
            .issue_type(IssueType::Epic)
            .build();
        let done = IssueBuilder::new("Done child")
            .id("done")
            .status(Status::Closed)
            .closed_at(chrono::Utc::now())
            .build();
        let open = IssueBuilder::new("Open child").id("open").build();
        let grand = IssueBuilder::new("Grandchild").id("grand").build();

        let deps = vec![
            Dependency::new("done", "epic", DependencyType::ParentChild, ""),
            Dependency::new("open", "epic", DependencyType::ParentChild, ""),
            Dependency::new("grand", "open", DependencyType::ParentChild, ""),
            // grand is blocked by open.
            Dependency::new("grand", "open", DependencyType::Blocks, ""),
        ];
        // The (grand, open) pair appears with two types; storage keys edges
        // by (issue, depends_on) but the snapshot accepts both for analysis.
        GraphSnapshot::new(vec![epic, done, open, grand], &deps)
    }

    #[test]
    fn descendants_are_transitive() {
        let snap = epic_snapshot();
        let mut ids: Vec<String> = descendants(&snap, "epic")
            .unwrap()
            .into_iter()
            .map(|i| snap.issue(i).id.clone())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["done", "grand", "open"]);
    }

    #[test]
    fn progress_is_closed_over_total() {
        let snap = epic_snapshot();
        let p = progress(&snap, "epic").unwrap();
        assert_eq!(p, Progress { total: 3, closed: 1 });
        assert!((p.ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_epic_has_zero_ratio() {
        let epic = IssueBuilder::new("Lonely")
            .id("lonely")
            .issue_type(IssueType::Epic)
            .build();
        let snap = GraphSnapshot::new(vec![epic], &[]);
        let p = progress(&snap, "lonely").unwrap();
        assert_eq!(p.total, 0);
        assert_eq!(p.ratio(), 0.0);
    }

    #[test]
    fn ready_subset_respects_blocking() {
        let snap = epic_snapshot();
        let ready: Vec<String> = ready_descendants(&snap, "epic")
            .unwrap()
            .into_iter()
            .map(|i| snap.issue(i).id.clone())
            .collect();
        // "open" is ready; "grand" is blocked by it; "done" is closed.
        assert_eq!(ready, vec!["open"]);
    }

    #[test]
    fn unknown_epic_reported() {
        let snap = epic_snapshot();
        assert_eq!(
            progress(&snap, "ghost"),
            Err(GraphError::UnknownIssue("ghost".into()))
        );
    }
}
