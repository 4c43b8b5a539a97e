//! `bd cleanup` -- explicit tombstoning.

use serde_json::json;

use crate::cli::CleanupArgs;
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &CleanupArgs) -> CliResult<()> {
    let result = ctx.execute("tombstone", json!({"id": args.id}))?;

    if ctx.json {
        output_json(&result);
    } else if !ctx.quiet {
        println!("Tombstoned {}; it will not appear in any query", args.id);
    }
    Ok(())
}
