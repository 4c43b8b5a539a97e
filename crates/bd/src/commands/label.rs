//! `bd label` -- label management.

use serde_json::json;

use crate::cli::{LabelArgs, LabelCommands};
use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json, output_table};

pub fn run(ctx: &RuntimeContext, args: &LabelArgs) -> CliResult<()> {
    match &args.command {
        LabelCommands::Add { id, label } => {
            let result = ctx.execute("label.add", json!({"id": id, "label": label}))?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Labeled {id}: {}", result["labels"]);
            }
        }
        LabelCommands::Remove { id, label } => {
            let result = ctx.execute("label.remove", json!({"id": id, "label": label}))?;
            if ctx.json {
                output_json(&result);
            } else if !ctx.quiet {
                println!("Unlabeled {id}: {}", result["labels"]);
            }
        }
        LabelCommands::List => {
            let counts = ctx.execute("label.list", json!({}))?;
            if ctx.json {
                output_json(&counts);
            } else {
                let rows: Vec<Vec<String>> = counts
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .iter()
                    .map(|c| {
                        vec![
                            c["label"].as_str().unwrap_or("").to_string(),
                            c["count"].as_i64().unwrap_or(0).to_string(),
                        ]
                    })
                    .collect();
                output_table(&["LABEL", "COUNT"], &rows);
            }
        }
    }
    Ok(())
}
