//! `bd formula` -- workflow formula templates.

use serde_json::json;

use crate::cli::{FormulaArgs, FormulaCommands};
use crate::context::RuntimeContext;
use crate::output::{CliError, CliResult, issue_line, output_json};

pub fn run(ctx: &RuntimeContext, args: &FormulaArgs) -> CliResult<()> {
    match &args.command {
        FormulaCommands::Import { file } => {
            let text = std::fs::read_to_string(file).map_err(CliError::internal)?;
            let formula = ctx.execute("formula.import", json!({"toml": text}))?;
            if ctx.json {
                output_json(&formula);
            } else if !ctx.quiet {
                println!(
                    "Imported formula {} as {}",
                    formula["title"].as_str().unwrap_or("?"),
                    formula["id"].as_str().unwrap_or("?")
                );
            }
        }
        FormulaCommands::List => {
            let formulas = ctx.execute("formula.list", json!({}))?;
            if ctx.json {
                output_json(&formulas);
            } else {
                let rows = formulas.as_array().cloned().unwrap_or_default();
                if rows.is_empty() {
                    if !ctx.quiet {
                        println!("No formulas imported.");
                    }
                } else {
                    for formula in &rows {
                        println!("{}", issue_line(formula));
                    }
                }
            }
        }
        FormulaCommands::Show { name } => {
            let formula = ctx.execute("formula.show", json!({"name": name}))?;
            if ctx.json {
                output_json(&formula);
            } else {
                println!("{}", issue_line(&formula));
                if let Some(steps) = formula["metadata"]["steps"].as_array() {
                    for step in steps {
                        let needs: Vec<&str> = step["needs"]
                            .as_array()
                            .map(|n| n.iter().filter_map(|v| v.as_str()).collect())
                            .unwrap_or_default();
                        let suffix = if needs.is_empty() {
                            String::new()
                        } else {
                            format!(" (needs {})", needs.join(", "))
                        };
                        println!("  - {}{suffix}", step["title"].as_str().unwrap_or("?"));
                    }
                }
            }
        }
    }
    Ok(())
}
