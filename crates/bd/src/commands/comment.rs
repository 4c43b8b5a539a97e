//! `bd comment` -- comments on issues.

use serde_json::json;

use crate::cli::{CommentArgs, CommentCommands};
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &CommentArgs) -> CliResult<()> {
    match &args.command {
        CommentCommands::Add { id, text } => {
            let comment = ctx.execute("comment.add", json!({"id": id, "text": text}))?;
            if ctx.json {
                output_json(&comment);
            } else if !ctx.quiet {
                println!("Commented on {id}");
            }
        }
        CommentCommands::List { id } => {
            let comments = ctx.execute("comment.list", json!({"id": id}))?;
            if ctx.json {
                output_json(&comments);
            } else {
                for comment in comments.as_array().cloned().unwrap_or_default() {
                    println!(
                        "[{}] {}: {}",
                        comment["created_at"].as_str().unwrap_or(""),
                        comment["author"].as_str().unwrap_or("?"),
                        comment["text"].as_str().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}
