//! `bd inbox` -- agent mailbox operations.

use serde_json::json;

use crate::cli::{InboxArgs, InboxCommands};
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &InboxArgs) -> CliResult<()> {
    match &args.command {
        InboxCommands::Push {
            content,
            to,
            msg_type,
            dedup_key,
            priority,
            expires_in,
        } => {
            let result = ctx.execute(
                "inbox.push",
                json!({
                    "content": content,
                    "to": to,
                    "type": msg_type,
                    "dedup_key": dedup_key,
                    "priority": priority,
                    "expires_in_secs": expires_in,
                    "source": ctx.actor,
                }),
            )?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                let recipients: Vec<&str> = result["recipients"]
                    .as_array()
                    .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();
                println!(
                    "Pushed to {} ({} new)",
                    recipients.join(", "),
                    result["inserted"]
                );
            }
        }
        InboxCommands::List { agent, limit } => {
            let messages = ctx.execute("inbox.list", json!({"agent": agent, "limit": limit}))?;
            if ctx.json {
                output_json(&messages);
            } else {
                for msg in messages.as_array().cloned().unwrap_or_default() {
                    let delivered = if msg["delivered_at"].is_null() {
                        "pending"
                    } else {
                        "delivered"
                    };
                    println!(
                        "[P{} {delivered}] {}: {}",
                        msg["priority"].as_i64().unwrap_or(2),
                        msg["dedup_key"].as_str().unwrap_or("?"),
                        msg["content"].as_str().unwrap_or("")
                    );
                }
            }
        }
        InboxCommands::Drain {
            agent,
            session,
            session_start,
        } => {
            let result = ctx.execute(
                "inbox.drain",
                json!({"agent": agent, "session": session, "session_start": session_start}),
            )?;
            if ctx.json {
                output_json(&result);
            } else {
                for block in result["blocks"].as_array().cloned().unwrap_or_default() {
                    println!("{}", block.as_str().unwrap_or(""));
                }
            }
        }
    }
    Ok(())
}
