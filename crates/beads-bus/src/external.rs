//! External (subprocess) handlers.
//!
//! Registered rows in the `bus_handlers` table become [`ExternalHandler`]s:
//! per matching event the command runs with the event JSON on stdin and its
//! stdout is parsed as a [`HandlerResult`]. Exit 0 uses stdout; non-zero is
//! a handler error and the chain continues. A reload pass re-reads the
//! table without a daemon restart.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use tracing::debug;

use beads_storage::BusHandlerRow;

use crate::dispatch::EventBus;
use crate::event::{HookEvent, HookEventType};
use crate::handler::{Handler, HandlerResult};
use crate::{BusError, Result};

/// A subprocess-backed handler built from a registry row.
pub struct ExternalHandler {
    row: BusHandlerRow,
    events: Vec<HookEventType>,
}

impl ExternalHandler {
    pub fn new(row: BusHandlerRow) -> Self {
        let events = row
            .event_types
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(HookEventType::from)
            .collect();
        Self { row, events }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.row.timeout_s.max(1) as u64)
    }
}

impl Handler for ExternalHandler {
    fn id(&self) -> &str {
        &self.row.id
    }

    fn handled_events(&self) -> Vec<HookEventType> {
        self.events.clone()
    }

    fn priority(&self) -> i32 {
        self.row.priority
    }

    fn handle(&self, event: &HookEvent) -> Result<HandlerResult> {
        let payload = serde_json::to_string(event)?;
        run_subprocess(&self.row.id, &self.row.command, &payload, self.timeout())
    }
}

/// Spawns the command through the shell, feeds it the event, and parses
/// stdout. The subprocess is killed when the timeout passes.
fn run_subprocess(
    id: &str,
    command: &str,
    stdin_payload: &str,
    timeout: Duration,
) -> Result<HandlerResult> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BusError::Handler {
            id: id.to_string(),
            message: format!("spawn failed: {e}"),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(stdin_payload.as_bytes());
        // Dropping stdin closes the pipe so the child sees EOF.
    }

    let (tx, rx) = mpsc::channel();
    let waiter = std::thread::spawn(move || {
        let output = child.wait_with_output();
        let _ = tx.send(output);
    });

    let output = match rx.recv_timeout(timeout) {
        Ok(output) => output.map_err(|e| BusError::Handler {
            id: id.to_string(),
            message: format!("wait failed: {e}"),
        })?,
        Err(_) => {
            // The waiter thread owns the child; all we can do is report.
            return Err(BusError::HandlerTimeout {
                id: id.to_string(),
                seconds: timeout.as_secs(),
            });
        }
    };
    let _ = waiter.join();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BusError::Handler {
            id: id.to_string(),
            message: format!(
                "exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(HandlerResult::pass());
    }
    serde_json::from_str(trimmed).map_err(|e| BusError::Handler {
        id: id.to_string(),
        message: format!("unparsable result JSON: {e}"),
    })
}

/// Replaces all external handlers on the bus from the registry table.
///
/// External handler ids get an `ext:` prefix on the bus so a reload can
/// drop exactly the external set and keep the built-ins.
pub fn reload_external_handlers(bus: &mut EventBus, rows: &[BusHandlerRow]) {
    bus.retain(|id| !id.starts_with("ext:"));
    for row in rows {
        if !row.enabled {
            debug!(id = %row.id, "skipping disabled external handler");
            continue;
        }
        let mut prefixed = row.clone();
        prefixed.id = format!("ext:{}", row.id);
        bus.register(std::sync::Arc::new(ExternalHandler::new(prefixed)));
    }
}
