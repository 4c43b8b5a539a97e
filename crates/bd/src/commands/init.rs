//! `bd init` -- initialize a workspace.

use std::env;

use beads_config::{RuntimePaths, WorkspaceConfig, WorkspaceMetadata, ensure_beads_dir};
use beads_storage::{Backend, Storage};

use crate::cli::InitArgs;
use crate::context::RuntimeContext;
use crate::output::{CliError, CliResult, output_json};

pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> CliResult<()> {
    let cwd = env::current_dir().map_err(CliError::internal)?;
    let beads_dir = ensure_beads_dir(&cwd)?;

    if beads_dir.join("metadata.json").exists() {
        return Err(CliError::invalid(
            "workspace already initialized (.beads/metadata.json exists)",
        ));
    }

    let backend = match args.backend.as_str() {
        "embedded" => Backend::Embedded,
        "versioned" => Backend::Versioned,
        other => {
            return Err(CliError::invalid(format!(
                "unknown backend '{other}' (embedded or versioned)"
            )));
        }
    };

    let metadata = WorkspaceMetadata::new(backend, &args.prefix);
    metadata.save(&beads_dir)?;
    beads_config::save_config(&beads_dir, &WorkspaceConfig::default())?;

    // Create the database and its schema up front.
    let db_path = metadata.db_path(&beads_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(CliError::internal)?;
    }
    let store = beads_storage::open_backend(backend, &db_path)
        .map_err(|e| CliError::internal(e.to_string()))?;
    store
        .set_config("issue_prefix", &args.prefix)
        .map_err(|e| CliError::internal(e.to_string()))?;

    RuntimePaths::for_workspace(&cwd).ensure()?;

    // Register the union merge driver when the workspace is git-tracked.
    let merge_driver = match beads_git::sync::install_merge_driver(&cwd) {
        Ok(()) => true,
        Err(beads_git::GitError::NotARepo) => false,
        Err(e) => return Err(CliError::internal(e)),
    };

    if ctx.json {
        output_json(&serde_json::json!({
            "beads_dir": beads_dir.display().to_string(),
            "prefix": args.prefix,
            "backend": args.backend,
            "merge_driver": merge_driver,
        }));
    } else if !ctx.quiet {
        println!("Initialized beads workspace in {}", beads_dir.display());
        println!("  prefix: {}", args.prefix);
        println!("  backend: {}", args.backend);
        if merge_driver {
            println!("  merge driver registered in .gitattributes");
        } else {
            println!("  (not a git repository; merge driver not installed)");
        }
    }
    Ok(())
}
