//! Discovery and creation of the `.beads/` directory.
//!
//! The `.beads/` directory is the root of a workspace's metadata and the
//! unit of federation. Discovery walks up from the current directory; the
//! `BEADS_DIR` environment variable takes priority.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// The name of the beads metadata directory.
pub const BEADS_DIR_NAME: &str = ".beads";

/// Environment variable that overrides workspace discovery.
pub const BEADS_DIR_ENV: &str = "BEADS_DIR";

/// Walks up the directory tree from `start` looking for `.beads/`.
///
/// Returns `None` if the filesystem root is reached without finding one.
/// `BEADS_DIR` is checked first.
pub fn find_beads_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(BEADS_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        let candidate = current.join(BEADS_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }
    None
}

/// Like [`find_beads_dir`] but converts `None` into
/// [`ConfigError::BeadsDirNotFound`].
pub fn find_beads_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_beads_dir(start).ok_or(ConfigError::BeadsDirNotFound)
}

/// Ensures a `.beads/` directory exists at (or under) the given path and
/// returns its path.
pub fn ensure_beads_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let beads_dir = if path.ends_with(BEADS_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(BEADS_DIR_NAME)
    };
    std::fs::create_dir_all(&beads_dir)?;
    Ok(beads_dir)
}

/// The workspace root is the parent of `.beads/`.
pub fn workspace_root(beads_dir: &Path) -> PathBuf {
    beads_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| beads_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_in_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let beads = dir.path().join(".beads");
        std::fs::create_dir(&beads).unwrap();

        let found = find_beads_dir(dir.path()).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            beads.canonicalize().unwrap()
        );
    }

    #[test]
    fn find_from_nested_child() {
        let dir = tempfile::tempdir().unwrap();
        let beads = dir.path().join(".beads");
        std::fs::create_dir(&beads).unwrap();
        let child = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&child).unwrap();

        let found = find_beads_dir(&child).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            beads.canonicalize().unwrap()
        );
    }

    #[test]
    fn ensure_creates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_beads_dir(dir.path()).unwrap();
        assert!(first.is_dir());
        assert!(first.ends_with(".beads"));
        let second = ensure_beads_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ensure_accepts_beads_path_itself() {
        let dir = tempfile::tempdir().unwrap();
        let beads = dir.path().join(".beads");
        let result = ensure_beads_dir(&beads).unwrap();
        assert_eq!(result, beads);
    }

    #[test]
    fn workspace_root_is_parent() {
        let dir = tempfile::tempdir().unwrap();
        let beads = ensure_beads_dir(dir.path()).unwrap();
        assert_eq!(
            workspace_root(&beads).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
