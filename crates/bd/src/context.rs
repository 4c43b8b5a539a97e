//! Runtime context and operation routing for command execution.

use std::env;
use std::path::PathBuf;
use std::process::Command;

use beads_daemon::protocol::Request;
use beads_daemon::{DaemonClient, DaemonContext, NO_DAEMON_ENV, handlers};

use crate::cli::GlobalArgs;
use crate::output::{CliError, CliResult};

/// Runtime context passed to every command handler.
pub struct RuntimeContext {
    /// Actor name for the audit trail.
    pub actor: String,

    /// Whether to produce JSON output.
    pub json: bool,

    pub verbose: bool,

    pub quiet: bool,
}

impl RuntimeContext {
    /// Builds a context from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            actor: resolve_actor(global.actor.as_deref()),
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// Finds the workspace root (the parent of `.beads/`).
    pub fn workspace_root(&self) -> CliResult<PathBuf> {
        let cwd = env::current_dir().map_err(CliError::internal)?;
        let beads_dir = beads_config::find_beads_dir(&cwd).ok_or_else(|| {
            CliError::invalid("no .beads directory found (run 'bd init' first)")
        })?;
        Ok(beads_config::beads_dir::workspace_root(&beads_dir))
    }

    /// Executes one operation, attaching the actor to the payload.
    ///
    /// Routed through the workspace daemon (autostarting it) unless
    /// `BEADS_NO_DAEMON=1`, which runs the same handler in-process.
    pub fn execute(&self, op: &str, mut payload: serde_json::Value) -> CliResult<serde_json::Value> {
        if let Some(map) = payload.as_object_mut() {
            map.entry("actor")
                .or_insert_with(|| serde_json::Value::String(self.actor.clone()));
        }
        let root = self.workspace_root()?;
        let request = Request::new(op, payload);

        let response = if no_daemon_mode() {
            let ctx = DaemonContext::open(&root).map_err(CliError::from)?;
            handlers::handle_request(&ctx, &request)
        } else {
            let client = DaemonClient::ensure_running(&root).map_err(CliError::from)?;
            client.request(&request).map_err(CliError::from)?
        };

        if response.ok {
            Ok(response.payload)
        } else {
            Err(CliError::from_info(response.error.unwrap_or_else(|| {
                beads_daemon::RpcErrorInfo::new("internal", "daemon returned no error detail")
            })))
        }
    }
}

/// Returns `true` when operations run in-process (testing mode).
pub fn no_daemon_mode() -> bool {
    env::var(NO_DAEMON_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Resolves the actor name.
///
/// Priority: explicit flag > BD_ACTOR > BEADS_ACTOR > git config user.name >
/// USER > "unknown".
fn resolve_actor(flag_value: Option<&str>) -> String {
    if let Some(actor) = flag_value {
        if !actor.is_empty() {
            return actor.to_string();
        }
    }
    for var in ["BD_ACTOR", "BEADS_ACTOR"] {
        if let Ok(actor) = env::var(var) {
            if !actor.is_empty() {
                return actor;
            }
        }
    }
    if let Ok(output) = Command::new("git").args(["config", "user.name"]).output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }
    "unknown".to_string()
}
