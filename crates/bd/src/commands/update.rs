//! `bd update` -- partial issue update.

use serde_json::json;

use crate::cli::UpdateArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &UpdateArgs) -> CliResult<()> {
    let payload = json!({
        "id": args.id,
        "title": args.title,
        "description": args.description,
        "status": args.status,
        "priority": args.priority,
        "type": args.issue_type,
        "assignee": args.assignee,
    });

    let issue = ctx.execute("update", payload)?;

    if ctx.json {
        output_json(&issue);
    } else if !ctx.quiet {
        println!("Updated {}", issue_line(&issue));
    }
    Ok(())
}
