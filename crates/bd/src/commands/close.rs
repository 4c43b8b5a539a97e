//! `bd close` / `bd reopen`.

use serde_json::json;

use crate::cli::CloseArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &CloseArgs) -> CliResult<()> {
    let payload = json!({
        "id": args.id,
        "reason": args.reason,
        "force": args.force,
        "session": args.session,
    });
    let result = ctx.execute("close", payload)?;

    if ctx.json {
        output_json(&result);
    } else if !ctx.quiet {
        println!(
            "Closed {} ({})",
            args.id,
            args.reason.as_deref().unwrap_or("closed")
        );
    }
    Ok(())
}

pub fn run_reopen(ctx: &RuntimeContext, args: &CloseArgs) -> CliResult<()> {
    let result = ctx.execute("reopen", json!({"id": args.id}))?;

    if ctx.json {
        output_json(&result);
    } else if !ctx.quiet {
        println!("Reopened {}", args.id);
    }
    Ok(())
}
