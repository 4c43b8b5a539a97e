//! Daemon lifecycle: startup, background timers, crash reports, shutdown.

use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use beads_config::runtime_dir;
use beads_inbox::gates::HttpGithubProbe;
use beads_lockfile::{LockError, PidFile};

use crate::backends::install_handlers;
use crate::context::DaemonContext;
use crate::server::Server;
use crate::{DaemonError, Result};

/// Runs the daemon for a workspace until shutdown. This is the body of
/// `bd daemon run`.
pub fn run(workspace_root: &Path) -> Result<()> {
    // PID + lock file: exactly one daemon per workspace. The lock guard
    // lives for the whole serve loop.
    let lock_path = runtime_dir::daemon_lock_path(workspace_root);
    let _pid_file = match PidFile::claim(&lock_path) {
        Ok(pid_file) => pid_file,
        Err(LockError::WouldBlock { .. }) => {
            return Err(DaemonError::AlreadyRunning(PidFile::read_pid(&lock_path)));
        }
        Err(e) => return Err(e.into()),
    };

    let socket_path = runtime_dir::socket_path(workspace_root);
    // A stale socket from a crashed daemon blocks bind; the PID lock above
    // proves no live daemon owns it.
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "daemon starting");

    let ctx = match DaemonContext::open(workspace_root) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            write_crash_report(workspace_root, &e);
            return Err(e);
        }
    };

    // Import anything git dropped into the federation files while we were
    // away, then wire the handler chain.
    if let Err(e) = beads_federation::import::import_issues(ctx.store.as_ref(), &ctx.federation) {
        warn!(error = %e, "startup import failed; continuing");
    }
    install_handlers(&ctx);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let _ = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    let timers = spawn_timers(ctx.clone(), shutdown.clone());

    let server = Server::new(ctx.clone(), shutdown.clone());
    let result = server.serve(listener);

    shutdown.store(true, Ordering::SeqCst);
    let _ = timers.join();
    let _ = std::fs::remove_file(&socket_path);

    if let Err(ref e) = result {
        // Unrecoverable: log, dump a crash report, exit non-zero; the next
        // client call restarts the daemon.
        error!(error = %e, "daemon crashed");
        write_crash_report(workspace_root, e);
    }
    result
}

/// Background timers: the gate evaluation loop, the inbox reaper, and the
/// federation import watcher.
fn spawn_timers(
    ctx: Arc<DaemonContext>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let gate_interval = Duration::from_secs(ctx.config.daemon.gate_check_interval_secs.max(5));
        let reap_interval = Duration::from_secs(3600);
        let import_interval = Duration::from_secs(10);

        let probe = HttpGithubProbe::new(std::env::var("GITHUB_TOKEN").ok());
        let mut last_gate = Instant::now();
        let mut last_reap = Instant::now();
        let mut last_import = Instant::now();
        let mut issues_mtime = file_mtime(&ctx.federation.issues());

        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(250));

            if last_gate.elapsed() >= gate_interval {
                last_gate = Instant::now();
                match beads_inbox::gates::check_db_gates(
                    ctx.store.as_ref(),
                    &probe,
                    chrono::Utc::now(),
                    "daemon",
                ) {
                    Ok(resolved) if !resolved.is_empty() => {
                        info!(count = resolved.len(), "gates resolved by timer pass");
                        ctx.after_write(&resolved);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "gate pass failed"),
                }
            }

            if last_reap.elapsed() >= reap_interval {
                last_reap = Instant::now();
                let cutoff = chrono::Utc::now()
                    - chrono::Duration::hours(ctx.config.daemon.inbox_retention_hours as i64);
                match ctx.store.inbox_reap(cutoff) {
                    Ok(reaped) if reaped > 0 => info!(reaped, "inbox rows reaped"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "inbox reap failed"),
                }
            }

            // Git may rewrite the federation file on merge/pull; re-import
            // on observed change.
            if last_import.elapsed() >= import_interval {
                last_import = Instant::now();
                let current = file_mtime(&ctx.federation.issues());
                if current != issues_mtime {
                    issues_mtime = current;
                    match beads_federation::import::import_issues(
                        ctx.store.as_ref(),
                        &ctx.federation,
                    ) {
                        Ok(stats) if stats.applied() > 0 => {
                            info!(
                                created = stats.created,
                                updated = stats.updated,
                                "re-imported federation file"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "re-import failed"),
                    }
                }
            }
        }
    })
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Dumps a crash report into the workspace for the doctor to find.
pub fn write_crash_report(workspace_root: &Path, error: &DaemonError) {
    let path = workspace_root.join(".beads").join("crash.log");
    let report = format!(
        "{}|pid {}|{}\n",
        chrono::Utc::now().to_rfc3339(),
        std::process::id(),
        error
    );
    if let Err(e) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| std::io::Write::write_all(&mut f, report.as_bytes()))
    {
        error!(error = %e, "failed to write crash report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::init_test_workspace;

    #[test]
    fn second_daemon_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = init_test_workspace(dir.path());
        let lock_path = dir.path().join("daemon.pid");

        // Simulate a live daemon by holding the PID lock.
        let _held = PidFile::claim(&lock_path).unwrap();

        // Second claim on the same path fails like a second daemon would.
        let second = PidFile::claim(&lock_path);
        assert!(second.is_err());
        let _ = root;
    }

    #[test]
    fn crash_report_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let root = init_test_workspace(dir.path());
        write_crash_report(&root, &DaemonError::Unavailable("test".into()));
        write_crash_report(&root, &DaemonError::Unavailable("again".into()));

        let text = std::fs::read_to_string(root.join(".beads/crash.log")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("daemon unavailable"));
    }
}
