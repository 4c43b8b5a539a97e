//! Sync choreography: commit the federation files, pull, push.
//!
//! Pull may rewrite `.beads/*.jsonl` through the union merge driver; the
//! caller re-imports afterwards. Export failures never reach git: sync only
//! stages files that already exist.

use std::path::Path;

use tracing::{debug, info};

use crate::commands::{GitError, Result, git_command, is_git_repo};

/// Name of the merge driver registered in git config.
pub const MERGE_DRIVER_NAME: &str = "beads-union";

/// Federation files staged by sync, relative to the workspace root.
pub const SYNC_PATHS: &[&str] = &[
    ".beads/issues.jsonl",
    ".beads/comments.jsonl",
    ".beads/labels.jsonl",
    ".beads/dependencies.jsonl",
    ".beads/inbox.jsonl",
    ".beads/events.log",
];

/// Stages and commits the federation files. Returns `true` when a commit
/// was created (no-op when nothing changed).
pub fn commit_federation_files(workspace_root: &Path, message: &str) -> Result<bool> {
    if !is_git_repo(workspace_root) {
        return Err(GitError::NotARepo);
    }

    for path in SYNC_PATHS {
        if workspace_root.join(path).exists() {
            git_command(&["add", path], workspace_root)?;
        }
    }

    // Anything staged?
    let status = git_command(&["status", "--porcelain", "--", ".beads"], workspace_root)?;
    if status.is_empty() {
        debug!("no federation changes to commit");
        return Ok(false);
    }

    git_command(&["commit", "-m", message, "--", ".beads"], workspace_root)?;
    info!(%message, "committed federation files");
    Ok(true)
}

/// Pulls from the default remote. The union merge driver resolves JSONL
/// conflicts; the caller re-imports the files afterwards.
pub fn pull(workspace_root: &Path) -> Result<()> {
    git_command(&["pull", "--no-rebase"], workspace_root)?;
    Ok(())
}

/// Pushes to the default remote.
pub fn push(workspace_root: &Path) -> Result<()> {
    git_command(&["push"], workspace_root)?;
    Ok(())
}

/// Installs the union merge driver: a config entry naming the `bd merge-file`
/// subcommand and `.gitattributes` lines binding the federation files to it.
pub fn install_merge_driver(workspace_root: &Path) -> Result<()> {
    if !is_git_repo(workspace_root) {
        return Err(GitError::NotARepo);
    }

    git_command(
        &[
            "config",
            &format!("merge.{MERGE_DRIVER_NAME}.name"),
            "beads union merge of line-delimited records",
        ],
        workspace_root,
    )?;
    git_command(
        &[
            "config",
            &format!("merge.{MERGE_DRIVER_NAME}.driver"),
            "bd merge-file %A %O %B",
        ],
        workspace_root,
    )?;

    let attributes_path = workspace_root.join(".gitattributes");
    let existing = std::fs::read_to_string(&attributes_path).unwrap_or_default();
    let mut lines: Vec<String> = existing.lines().map(str::to_string).collect();
    let wanted = format!(".beads/*.jsonl merge={MERGE_DRIVER_NAME}");
    if !lines.iter().any(|l| l.trim() == wanted) {
        lines.push(wanted);
        std::fs::write(&attributes_path, lines.join("\n") + "\n").map_err(GitError::Spawn)?;
        info!("registered merge driver in .gitattributes");
    }

    Ok(())
}
