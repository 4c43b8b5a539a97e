//! Dependency graph and readiness engine.
//!
//! Pure in-memory graph algorithms over issue/edge snapshots: readiness,
//! cycle detection, topological ordering, and epic rollups. The storage
//! layer keeps the persistent blocked cache; these functions give the same
//! answers from a snapshot, which the doctor uses to cross-check the cache
//! and the daemon uses for intake audits.
//!
//! The graph is never stored as a pointer structure: nodes live in an arena
//! indexed by position and edges are `(usize, usize)` pairs into it.

pub mod cycle;
pub mod readiness;
pub mod rollup;
pub mod topo;

use std::collections::HashMap;

use beads_core::dependency::Dependency;
use beads_core::enums::DependencyType;
use beads_core::issue::Issue;

/// Error type for graph operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("adding edge {from} -> {to} would create a cycle")]
    Cycle { from: String, to: String },

    #[error("unknown issue: {0}")]
    UnknownIssue(String),
}

/// An arena-of-nodes snapshot of the dependency graph.
///
/// Edges reference node indices; issues referenced by an edge but absent
/// from the snapshot (tombstoned, foreign) are treated as satisfied.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    pub(crate) nodes: Vec<Issue>,
    pub(crate) index: HashMap<String, usize>,
    /// `(source, target, type)` index pairs: source depends on target.
    pub(crate) edges: Vec<(usize, usize, DependencyType)>,
}

impl GraphSnapshot {
    /// Builds a snapshot from issues and raw dependency records.
    pub fn new(issues: Vec<Issue>, deps: &[Dependency]) -> Self {
        let mut index = HashMap::with_capacity(issues.len());
        for (i, issue) in issues.iter().enumerate() {
            index.insert(issue.id.clone(), i);
        }
        let mut edges = Vec::with_capacity(deps.len());
        for dep in deps {
            if let (Some(&src), Some(&dst)) =
                (index.get(&dep.issue_id), index.get(&dep.depends_on_id))
            {
                edges.push((src, dst, dep.dep_type.clone()));
            }
            // Edges to unknown nodes are orphaned and count as satisfied.
        }
        Self {
            nodes: issues,
            index,
            edges,
        }
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the snapshot holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node index by issue id.
    pub fn node(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// The issue at a node index.
    pub fn issue(&self, idx: usize) -> &Issue {
        &self.nodes[idx]
    }
}
