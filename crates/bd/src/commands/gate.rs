//! `bd gate` -- gate management.

use serde_json::json;

use crate::cli::{GateArgs, GateCommands};
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &GateArgs) -> CliResult<()> {
    match &args.command {
        GateCommands::Check { session } => {
            let result = ctx.execute("gate.check", json!({"session": session}))?;
            if ctx.json {
                output_json(&result);
            } else {
                let resolved = result["resolved"].as_array().cloned().unwrap_or_default();
                let open = result["open"].as_array().cloned().unwrap_or_default();
                if !resolved.is_empty() {
                    let ids: Vec<&str> = resolved.iter().filter_map(|v| v.as_str()).collect();
                    println!("Resolved: {}", ids.join(", "));
                }
                if open.is_empty() {
                    println!("No open gates.");
                } else {
                    let ids: Vec<&str> = open.iter().filter_map(|v| v.as_str()).collect();
                    println!("Open: {}", ids.join(", "));
                }
                for gate in result["session_unresolved"].as_array().cloned().unwrap_or_default() {
                    println!(
                        "Session gate unresolved: {} ({})",
                        gate["id"].as_str().unwrap_or("?"),
                        if gate["strict"].as_bool().unwrap_or(false) {
                            "strict"
                        } else {
                            "soft"
                        }
                    );
                }
            }
        }
        GateCommands::Register {
            title,
            await_type,
            await_id,
            timeout,
            waiter,
            session,
            strict,
        } => {
            let payload = match session {
                Some(session) => json!({
                    "scope": "session",
                    "session": session,
                    "gate_id": title,
                    "strict": strict,
                }),
                None => json!({
                    "scope": "db",
                    "title": title,
                    "await_type": await_type,
                    "await_id": await_id,
                    "timeout_secs": timeout,
                    "waiters": waiter,
                }),
            };
            let result = ctx.execute("gate.register", payload)?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                match result["id"].as_str() {
                    Some(id) => println!("Registered gate {id}"),
                    None => println!("Registered session gate {title}"),
                }
            }
        }
        GateCommands::Resolve { id, reason, session } => {
            let payload = match session {
                Some(session) => json!({"session": session, "gate_id": id}),
                None => json!({"id": id, "reason": reason}),
            };
            let result = ctx.execute("gate.resolve", payload)?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Resolved gate {id}");
            }
        }
    }
    Ok(())
}
