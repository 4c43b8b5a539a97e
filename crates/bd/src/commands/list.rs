//! `bd list`.

use serde_json::json;

use crate::cli::ListArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &ListArgs) -> CliResult<()> {
    let payload = json!({
        "status": args.status,
        "all": args.all,
        "type": args.issue_type,
        "priority": args.priority,
        "assignee": args.assignee,
        "text": args.text,
        "labels": args.label,
        "labels_any": args.label_any,
        "after_id": args.after,
        "limit": args.limit,
    });
    let issues = ctx.execute("list", payload)?;

    if ctx.json {
        output_json(&issues);
        return Ok(());
    }

    let rows = issues.as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        if !ctx.quiet {
            println!("No issues found.");
        }
        return Ok(());
    }
    for issue in &rows {
        println!("{}", issue_line(issue));
    }
    Ok(())
}
