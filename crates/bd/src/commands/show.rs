//! `bd show` and `bd epic`.

use serde_json::json;

use crate::cli::ShowArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json, styled_status};

pub fn run(ctx: &RuntimeContext, args: &ShowArgs) -> CliResult<()> {
    let issue = ctx.execute("show", json!({"id": args.id}))?;

    if ctx.json {
        output_json(&issue);
        return Ok(());
    }

    println!(
        "{}: {}",
        issue["id"].as_str().unwrap_or("?"),
        issue["title"].as_str().unwrap_or("")
    );
    println!(
        "  status: {}   priority: P{}   type: {}",
        styled_status(issue["status"].as_str().unwrap_or("open")),
        issue["priority"].as_i64().unwrap_or(2),
        issue["issue_type"].as_str().unwrap_or("task"),
    );
    if let Some(assignee) = issue["assignee"].as_str() {
        println!("  assignee: {assignee}");
    }
    if let Some(description) = issue["description"].as_str() {
        println!("\n{description}");
    }
    if let Some(labels) = issue["labels"].as_array().filter(|l| !l.is_empty()) {
        let joined: Vec<&str> = labels.iter().filter_map(|v| v.as_str()).collect();
        println!("\n  labels: {}", joined.join(", "));
    }
    if let Some(deps) = issue["dependencies"].as_array().filter(|d| !d.is_empty()) {
        println!("  depends on:");
        for dep in deps {
            println!(
                "    {} ({})",
                dep["depends_on_id"].as_str().unwrap_or("?"),
                dep["type"].as_str().unwrap_or("blocks")
            );
        }
    }
    if let Some(comments) = issue["comments"].as_array().filter(|c| !c.is_empty()) {
        println!("\n  comments:");
        for comment in comments {
            println!(
                "    [{}] {}",
                comment["author"].as_str().unwrap_or("?"),
                comment["text"].as_str().unwrap_or("")
            );
        }
    }
    Ok(())
}

pub fn run_epic(ctx: &RuntimeContext, args: &ShowArgs) -> CliResult<()> {
    let rollup = ctx.execute("epic.rollup", json!({"id": args.id}))?;

    if ctx.json {
        output_json(&rollup);
        return Ok(());
    }

    let total = rollup["total_children"].as_i64().unwrap_or(0);
    let closed = rollup["closed_children"].as_i64().unwrap_or(0);
    println!(
        "{}: {closed}/{total} closed",
        rollup["epic"]["id"].as_str().unwrap_or("?")
    );
    if let Some(ready) = rollup["ready"].as_array().filter(|r| !r.is_empty()) {
        let ids: Vec<&str> = ready.iter().filter_map(|v| v.as_str()).collect();
        println!("  ready now: {}", ids.join(", "));
    }
    Ok(())
}
