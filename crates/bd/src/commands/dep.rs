//! `bd dep` -- dependency edges.

use serde_json::json;

use crate::cli::{DepArgs, DepCommands};
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &DepArgs) -> CliResult<()> {
    match &args.command {
        DepCommands::Add { from, to, dep_type } => {
            let result = ctx.execute(
                "dep.add",
                json!({"from": from, "to": to, "type": dep_type}),
            )?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("{from} now depends on {to} ({dep_type})");
            }
        }
        DepCommands::Remove { from, to } => {
            let result = ctx.execute("dep.remove", json!({"from": from, "to": to}))?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Removed dependency {from} -> {to}");
            }
        }
    }
    Ok(())
}
