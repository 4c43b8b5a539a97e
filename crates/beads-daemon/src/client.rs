//! RPC client with daemon autostart.
//!
//! Any client command probes for a running daemon; on a miss it spawns one
//! (workspace-scoped) and waits, bounded, for readiness. A start lock makes
//! sure only the first prober spawns -- the rest busy-wait with exponential
//! backoff up to a ceiling.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use beads_config::runtime_dir;
use beads_lockfile::{LockError, LockFile};

use crate::protocol::{Request, Response, read_frame, write_frame};
use crate::{DaemonError, Result};

/// Total time a prober waits for a spawned daemon to come up.
const STARTUP_WAIT: Duration = Duration::from_secs(10);

/// Backoff ceiling while probing.
const BACKOFF_CEILING: Duration = Duration::from_millis(500);

/// A connected RPC client for one workspace daemon.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connects to an already-running daemon.
    pub fn connect(workspace_root: &Path) -> Result<Self> {
        let socket_path = runtime_dir::socket_path(workspace_root);
        let client = Self { socket_path };
        client.probe()?;
        Ok(client)
    }

    /// Connects, autostarting the daemon if none serves the workspace.
    pub fn ensure_running(workspace_root: &Path) -> Result<Self> {
        let socket_path = runtime_dir::socket_path(workspace_root);
        let client = Self {
            socket_path: socket_path.clone(),
        };
        if client.probe().is_ok() {
            return Ok(client);
        }

        // Fine-grained start lock: only the first prober that finds no
        // daemon spawns one.
        let start_lock_path = socket_path.with_extension("start");
        match LockFile::try_acquire(&start_lock_path) {
            Ok(_lock) => {
                // Re-probe under the lock; a daemon may have come up between
                // our probe and the acquire.
                if client.probe().is_err() {
                    spawn_daemon(workspace_root)?;
                }
            }
            Err(LockError::WouldBlock { .. }) => {
                debug!("another client is starting the daemon; waiting");
            }
            Err(e) => return Err(e.into()),
        }

        // Busy-wait with exponential backoff up to the ceiling.
        let deadline = Instant::now() + STARTUP_WAIT;
        let mut delay = Duration::from_millis(10);
        loop {
            match client.probe() {
                Ok(()) => return Ok(client),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(BACKOFF_CEILING);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The socket path this client talks to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Checks that something answers on the socket.
    fn probe(&self) -> Result<()> {
        UnixStream::connect(&self.socket_path)
            .map(|_| ())
            .map_err(|_| DaemonError::Unavailable(self.socket_path.display().to_string()))
    }

    /// Sends one request and waits for its response.
    pub fn request(&self, request: &Request) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .map_err(|_| DaemonError::Unavailable(self.socket_path.display().to_string()))?;
        if let Some(deadline_ms) = request.deadline_ms {
            let timeout = Duration::from_millis(deadline_ms.saturating_add(500));
            let _ = stream.set_read_timeout(Some(timeout));
        }
        write_frame(&mut stream, request)?;
        match read_frame(&mut stream)? {
            Some(response) => Ok(response),
            None => Err(DaemonError::Unavailable(
                "daemon closed the connection".into(),
            )),
        }
    }

    /// Convenience wrapper building the request envelope.
    pub fn call(&self, op: &str, payload: serde_json::Value) -> Result<Response> {
        self.request(&Request::new(op, payload))
    }
}

/// Spawns `bd daemon run` detached for the workspace.
fn spawn_daemon(workspace_root: &Path) -> Result<()> {
    let exe = std::env::current_exe()?;
    debug!(?exe, "spawning workspace daemon");
    std::process::Command::new(exe)
        .args(["daemon", "run"])
        .current_dir(workspace_root)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    Ok(())
}
