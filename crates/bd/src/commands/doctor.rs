//! `bd doctor` -- consistency checks and derived-state repair.

use serde_json::json;

use crate::context::RuntimeContext;
use crate::output::{CliResult, output_json};

pub fn run(ctx: &RuntimeContext) -> CliResult<()> {
    let report = ctx.execute("doctor", json!({}))?;

    if ctx.json {
        output_json(&report);
        return Ok(());
    }

    println!(
        "issues: {} total, {} open, {} closed, {} tombstoned",
        report["issues"], report["open"], report["closed"], report["tombstoned"]
    );
    println!(
        "federation file: {} lines, {} distinct ids",
        report["file_lines"], report["file_ids"]
    );
    println!("blocked cache drift: {}", report["cache_drift"]);

    let findings = report["findings"].as_array().cloned().unwrap_or_default();
    if findings.is_empty() {
        println!("healthy");
    } else {
        for finding in &findings {
            println!("finding: {}", finding.as_str().unwrap_or(""));
        }
    }
    Ok(())
}
