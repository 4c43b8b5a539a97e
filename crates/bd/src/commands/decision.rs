//! `bd decision` -- decision points.

use serde_json::json;

use crate::cli::{DecisionArgs, DecisionCommands};
use crate::context::RuntimeContext;
use crate::output::{CliError, CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &DecisionArgs) -> CliResult<()> {
    match &args.command {
        DecisionCommands::Create {
            title,
            prompt,
            option,
            default,
            requested_by,
        } => {
            let options = parse_options(option)?;
            let decision = ctx.execute(
                "decision.create",
                json!({
                    "title": title,
                    "prompt": prompt,
                    "options": options,
                    "default": default,
                    "requested_by": requested_by,
                }),
            )?;
            if ctx.json {
                output_json(&decision);
            } else if !ctx.quiet {
                println!("Created decision {}", decision["id"].as_str().unwrap_or("?"));
            }
        }
        DecisionCommands::Respond { id, selected, text } => {
            let result = ctx.execute(
                "decision.respond",
                json!({"id": id, "selected": selected, "text": text}),
            )?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!(
                    "Decision {id} resolved ({})",
                    selected.as_deref().or(text.as_deref()).unwrap_or("")
                );
            }
        }
        DecisionCommands::List => {
            let pending = ctx.execute("decision.list", json!({}))?;
            if ctx.json {
                output_json(&pending);
            } else {
                let rows = pending.as_array().cloned().unwrap_or_default();
                if rows.is_empty() {
                    if !ctx.quiet {
                        println!("No pending decisions.");
                    }
                } else {
                    for decision in &rows {
                        println!("{}", issue_line(decision));
                    }
                }
            }
        }
        DecisionCommands::Show { id } => {
            let decision = ctx.execute("decision.show", json!({"id": id}))?;
            if ctx.json {
                output_json(&decision);
            } else {
                println!("{}", issue_line(&decision));
                if let Some(meta) = decision["metadata"].as_object() {
                    if let Some(prompt) = meta.get("prompt").and_then(|p| p.as_str()) {
                        println!("  {prompt}");
                    }
                    for opt in meta
                        .get("options")
                        .and_then(|o| o.as_array())
                        .cloned()
                        .unwrap_or_default()
                    {
                        println!(
                            "    [{}] {}",
                            opt["id"].as_str().unwrap_or("?"),
                            opt["label"].as_str().unwrap_or("")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// Parses repeated `id=label` option flags.
fn parse_options(raw: &[String]) -> CliResult<Vec<serde_json::Value>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((id, label)) => Ok(json!({"id": id, "label": label})),
            None => Err(CliError::invalid(format!(
                "bad option '{pair}' (expected id=label)"
            ))),
        })
        .collect()
}
