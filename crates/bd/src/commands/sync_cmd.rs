//! `bd sync` -- export, commit, pull, import, push.

use serde_json::json;

use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext) -> CliResult<()> {
    let result = ctx.execute("sync", json!({}))?;

    if ctx.json {
        output_json(&result);
        return Ok(());
    }

    println!(
        "exported {} lines, imported {} new / {} updated",
        result["exported"], result["imported_created"], result["imported_updated"]
    );
    if result["committed"].as_bool().unwrap_or(false) {
        println!("committed federation files");
    }
    for warning in result["warnings"].as_array().cloned().unwrap_or_default() {
        eprintln!("warning: {}", warning.as_str().unwrap_or(""));
    }
    Ok(())
}
