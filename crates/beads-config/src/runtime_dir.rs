//! Runtime directory layout: `.runtime/` under the workspace root.
//!
//! Holds the per-session inbox merge buffers and gate marker files, plus a
//! stable socket path for the workspace daemon derived from a hash of the
//! workspace root.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::Result;

/// Name of the runtime directory under the workspace root.
pub const RUNTIME_DIR_NAME: &str = ".runtime";

/// Resolved runtime paths for one workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimePaths {
    root: PathBuf,
}

impl RuntimePaths {
    /// Builds runtime paths for a workspace root (the parent of `.beads/`).
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self {
            root: workspace_root.join(RUNTIME_DIR_NAME),
        }
    }

    /// The runtime root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the runtime directory tree.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.root.join("inject-queue"))?;
        std::fs::create_dir_all(self.root.join("gates"))?;
        Ok(())
    }

    /// Inbox merge buffer for one session:
    /// `.runtime/inject-queue/<session>.jsonl`.
    pub fn inject_queue(&self, session_id: &str) -> PathBuf {
        self.root
            .join("inject-queue")
            .join(format!("{session_id}.jsonl"))
    }

    /// Directory of gate markers for one session:
    /// `.runtime/gates/<session>/`.
    pub fn gates_dir(&self, session_id: &str) -> PathBuf {
        self.root.join("gates").join(session_id)
    }

    /// Marker file for one session gate.
    pub fn gate_marker(&self, session_id: &str, gate_id: &str) -> PathBuf {
        self.gates_dir(session_id).join(gate_id)
    }
}

/// Derives the daemon socket path for a workspace.
///
/// Sockets live in the OS runtime directory (`$XDG_RUNTIME_DIR` or `/tmp`)
/// under a name keyed by a hash of the workspace root, so distinct
/// workspaces never collide and path length stays under the Unix socket
/// limit. `BEADS_SOCKET` overrides.
pub fn socket_path(workspace_root: &Path) -> PathBuf {
    if let Ok(path) = std::env::var("BEADS_SOCKET") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let digest = Sha256::digest(workspace_root.to_string_lossy().as_bytes());
    let short = hex_prefix(&digest, 12);
    runtime_base().join(format!("beads-{short}.sock"))
}

/// PID/lock file for the workspace daemon, next to the socket.
pub fn daemon_lock_path(workspace_root: &Path) -> PathBuf {
    let digest = Sha256::digest(workspace_root.to_string_lossy().as_bytes());
    let short = hex_prefix(&digest, 12);
    runtime_base().join(format!("beads-{short}.pid"))
}

fn runtime_base() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..chars].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::for_workspace(dir.path());
        paths.ensure().unwrap();

        assert!(paths.root().join("inject-queue").is_dir());
        assert!(paths.root().join("gates").is_dir());
        assert!(
            paths
                .inject_queue("sess-1")
                .ends_with(".runtime/inject-queue/sess-1.jsonl")
        );
        assert!(
            paths
                .gate_marker("sess-1", "bd-g1")
                .ends_with(".runtime/gates/sess-1/bd-g1")
        );
    }

    #[test]
    fn socket_path_is_stable_and_distinct() {
        let a = socket_path(Path::new("/srv/repo-a"));
        let b = socket_path(Path::new("/srv/repo-b"));
        assert_eq!(a, socket_path(Path::new("/srv/repo-a")));
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn lock_path_pairs_with_socket() {
        let sock = socket_path(Path::new("/srv/repo-a"));
        let lock = daemon_lock_path(Path::new("/srv/repo-a"));
        assert_ne!(sock, lock);
        assert!(lock.to_string_lossy().ends_with(".pid"));
    }
}
