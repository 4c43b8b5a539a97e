//! `bd bus` -- event bus operations.

use serde_json::json;

use crate::cli::{BusArgs, BusCommands};
use crate::context::RuntimeContext;
use crate::output::{CliError, CliResult, output_json, output_table};

pub fn run(ctx: &RuntimeContext, args: &BusArgs) -> CliResult<()> {
    match &args.command {
        BusCommands::Emit {
            event,
            session,
            agent,
            payload,
        } => {
            let event_payload: serde_json::Value = match payload {
                Some(text) => serde_json::from_str(text)
                    .map_err(|e| CliError::invalid(format!("bad payload JSON: {e}")))?,
                None => serde_json::Value::Null,
            };
            let result = ctx.execute(
                "bus.emit",
                json!({
                    "event": {
                        "event_type": event,
                        "session_id": session,
                        "agent_name": agent,
                        "payload": event_payload,
                    },
                }),
            )?;
            if ctx.json {
                output_json(&result);
            } else {
                let chain = &result["result"];
                if chain["block"].as_bool().unwrap_or(false) {
                    println!(
                        "BLOCKED: {}",
                        chain["reason"].as_str().unwrap_or("(no reason)")
                    );
                }
                for inject in chain["inject"].as_array().cloned().unwrap_or_default() {
                    println!("{}", inject.as_str().unwrap_or(""));
                }
                for warning in chain["warnings"].as_array().cloned().unwrap_or_default() {
                    eprintln!("warning: {}", warning.as_str().unwrap_or(""));
                }
                for error in result["handler_errors"].as_array().cloned().unwrap_or_default() {
                    eprintln!("handler error: {}", error.as_str().unwrap_or(""));
                }
            }
        }
        BusCommands::Register {
            id,
            events,
            command,
            priority,
            timeout,
        } => {
            let result = ctx.execute(
                "bus.register",
                json!({
                    "id": id,
                    "event_types": events,
                    "command": command,
                    "priority": priority,
                    "timeout_s": timeout,
                }),
            )?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Registered handler {id}");
            }
        }
        BusCommands::Unregister { id } => {
            let result = ctx.execute("bus.unregister", json!({"id": id}))?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Unregistered handler {id}");
            }
        }
        BusCommands::Handlers => {
            let handlers = ctx.execute("bus.handlers", json!({}))?;
            if ctx.json {
                output_json(&handlers);
            } else {
                let rows: Vec<Vec<String>> = handlers
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .map(|h| {
                        vec![
                            h["id"].as_str().unwrap_or("").to_string(),
                            h["priority"].as_i64().unwrap_or(0).to_string(),
                            h["event_types"].as_str().unwrap_or("").to_string(),
                            h["command"].as_str().unwrap_or("").to_string(),
                        ]
                    })
                    .collect();
                output_table(&["ID", "PRIORITY", "EVENTS", "COMMAND"], &rows);
            }
        }
    }
    Ok(())
}
