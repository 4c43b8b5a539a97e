//! `bd daemon` -- daemon management.

use serde_json::json;

use crate::cli::{DaemonArgs, DaemonCommands};
use crate::context::RuntimeContext;
use crate::output::{CliError, CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &DaemonArgs) -> CliResult<()> {
    match &args.command {
        DaemonCommands::Run => {
            let root = ctx.workspace_root()?;
            beads_daemon::lifecycle::run(&root).map_err(CliError::from)
        }
        DaemonCommands::Status => {
            let status = ctx.execute("daemon.status", json!({}))?;
            if ctx.json {
                output_json(&status);
            } else {
                println!(
                    "daemon pid {} serving {} ({} backend, {} issues)",
                    status["pid"], status["workspace"], status["backend"], status["issues"]
                );
            }
            Ok(())
        }
        DaemonCommands::Restart => {
            // Best-effort stop; the next call autostarts a fresh daemon.
            let _ = ctx.execute("daemon.stop", json!({}));
            std::thread::sleep(std::time::Duration::from_millis(300));
            let status = ctx.execute("daemon.status", json!({}))?;
            if !ctx.quiet {
                println!("daemon restarted (pid {})", status["pid"]);
            }
            Ok(())
        }
        DaemonCommands::Logs => {
            let root = ctx.workspace_root()?;
            let crash_log = root.join(".beads/crash.log");
            let events_log = root.join(".beads/events.log");
            if crash_log.exists() {
                println!("--- crash.log ---");
                print!("{}", std::fs::read_to_string(&crash_log).unwrap_or_default());
            }
            if events_log.exists() {
                println!("--- events.log (tail) ---");
                let text = std::fs::read_to_string(&events_log).unwrap_or_default();
                for line in text.lines().rev().take(50).collect::<Vec<_>>().iter().rev() {
                    println!("{line}");
                }
            }
            Ok(())
        }
    }
}
