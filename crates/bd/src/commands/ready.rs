//! `bd ready` and `bd blocked`.

use serde_json::json;

use crate::cli::ReadyArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &ReadyArgs) -> CliResult<()> {
    let payload = json!({
        "limit": args.limit,
        "assignee": args.assignee,
        "type": args.issue_type,
        "epic": args.epic,
        "labels": args.label,
    });
    let issues = ctx.execute("ready", payload)?;

    if ctx.json {
        output_json(&issues);
        return Ok(());
    }

    let rows = issues.as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        if !ctx.quiet {
            println!("No ready work.");
        }
        return Ok(());
    }
    for issue in &rows {
        println!("{}", issue_line(issue));
    }
    Ok(())
}

pub fn run_blocked(ctx: &RuntimeContext) -> CliResult<()> {
    let blocked = ctx.execute("blocked", json!({}))?;

    if ctx.json {
        output_json(&blocked);
        return Ok(());
    }

    let rows = blocked.as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        if !ctx.quiet {
            println!("Nothing is blocked.");
        }
        return Ok(());
    }
    for entry in &rows {
        let blockers: Vec<&str> = entry["blockers"]
            .as_array()
            .map(|b| b.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        println!(
            "{}  <- waiting on {}",
            issue_line(&entry["issue"]),
            blockers.join(", ")
        );
    }
    Ok(())
}
