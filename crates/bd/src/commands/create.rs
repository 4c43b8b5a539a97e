//! `bd create` -- create an issue.

use serde_json::json;

use crate::cli::CreateArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &CreateArgs) -> CliResult<()> {
    let mut deps: Vec<serde_json::Value> = args
        .depends_on
        .iter()
        .map(|id| json!({"depends_on": id, "type": "blocks"}))
        .collect();
    if let Some(ref parent) = args.parent {
        deps.push(json!({"depends_on": parent, "type": "parent-child"}));
    }

    let payload = json!({
        "title": args.title,
        "description": args.description,
        "type": args.issue_type,
        "priority": args.priority,
        "assignee": args.assignee,
        "labels": args.label,
        "deps": deps,
    });

    let issue = ctx.execute("create", payload)?;

    if ctx.json {
        output_json(&issue);
    } else if !ctx.quiet {
        println!("Created {}", issue_line(&issue));
    }
    Ok(())
}
