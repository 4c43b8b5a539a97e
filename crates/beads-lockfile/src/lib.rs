//! Advisory file locks and PID files.
//!
//! Wraps fs2's advisory locking behind RAII guards. Used by the daemon
//! (single-instance lock + PID file), the inbox merge buffer (exclusive
//! append/drain), and federation file appends.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Errors that can occur during lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the lock.
    #[error("{path} is locked by another process")]
    WouldBlock { path: PathBuf },
}

/// Result alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

fn io_err(path: &Path, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// An exclusively-locked file. The lock releases when the guard drops.
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Opens (creating if needed) and exclusively locks a file, blocking
    /// until the lock is available.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lockable(&path)?;
        file.lock_exclusive().map_err(|e| io_err(&path, e))?;
        Ok(Self { file, path })
    }

    /// Like [`LockFile::acquire`] but fails immediately when the lock is
    /// held elsewhere.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lockable(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::WouldBlock { path })
            }
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// The locked file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file contents while holding the lock.
    pub fn write_contents(&mut self, contents: &str) -> Result<()> {
        self.file.set_len(0).map_err(|e| io_err(&self.path, e))?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| io_err(&self.path, e))?;
        self.file
            .write_all(contents.as_bytes())
            .map_err(|e| io_err(&self.path, e))?;
        self.file.flush().map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }

    /// Reads the file contents while holding the lock.
    pub fn read_contents(&mut self) -> Result<String> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| io_err(&self.path, e))?;
        let mut contents = String::new();
        self.file
            .read_to_string(&mut contents)
            .map_err(|e| io_err(&self.path, e))?;
        Ok(contents)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// A PID file backed by an exclusive lock: exactly one live daemon per path.
pub struct PidFile {
    lock: LockFile,
}

impl PidFile {
    /// Claims the PID file for this process, writing the current pid.
    /// Fails with [`LockError::WouldBlock`] when another process holds it.
    pub fn claim(path: impl AsRef<Path>) -> Result<Self> {
        let mut lock = LockFile::try_acquire(path)?;
        lock.write_contents(&std::process::id().to_string())?;
        Ok(Self { lock })
    }

    /// Reads the pid recorded in a PID file, without locking it.
    ///
    /// `None` when the file is missing or does not parse.
    pub fn read_pid(path: impl AsRef<Path>) -> Option<u32> {
        let text = std::fs::read_to_string(path).ok()?;
        text.trim().parse().ok()
    }

    /// The PID file path.
    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.lock.path());
    }
}

fn open_lockable(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");
        {
            let _lock = LockFile::acquire(&path).unwrap();
            // Held: try_acquire on the same file from this process would
            // succeed on some platforms (same-process re-lock), so only the
            // cross-process behavior is contractual. Content ops work:
        }
        // Released: can re-acquire.
        let _again = LockFile::try_acquire(&path).unwrap();
    }

    #[test]
    fn contents_roundtrip_under_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = LockFile::acquire(dir.path().join("data.lock")).unwrap();
        lock.write_contents("hello").unwrap();
        assert_eq!(lock.read_contents().unwrap(), "hello");
        lock.write_contents("shorter").unwrap();
        assert_eq!(lock.read_contents().unwrap(), "shorter");
    }

    #[test]
    fn pid_file_records_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let pid_file = PidFile::claim(&path).unwrap();
        assert_eq!(PidFile::read_pid(&path), Some(std::process::id()));
        drop(pid_file);
        // Removed on drop.
        assert!(PidFile::read_pid(&path).is_none());
    }

    #[test]
    fn missing_pid_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(PidFile::read_pid(dir.path().join("nope.pid")), None);
    }
}
