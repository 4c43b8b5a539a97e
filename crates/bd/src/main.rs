//! `bd` -- dependency-aware issue tracker CLI.
//!
//! Parses arguments with clap, resolves the runtime context, and routes
//! every operation through the workspace daemon (spawning it on demand).
//! `BEADS_NO_DAEMON=1` executes operations in-process for tests.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;
use output::CliError;

fn main() {
    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("bd=debug,beads_daemon=debug,beads_storage=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Commands::Init(args) => commands::init::run(&ctx, &args),
        Commands::Create(args) => commands::create::run(&ctx, &args),
        Commands::Update(args) => commands::update::run(&ctx, &args),
        Commands::Close(args) => commands::close::run(&ctx, &args),
        Commands::Reopen(args) => commands::close::run_reopen(&ctx, &args),
        Commands::Show(args) => commands::show::run(&ctx, &args),
        Commands::List(args) => commands::list::run(&ctx, &args),
        Commands::Ready(args) => commands::ready::run(&ctx, &args),
        Commands::Blocked => commands::ready::run_blocked(&ctx),
        Commands::Dep(args) => commands::dep::run(&ctx, &args),
        Commands::Label(args) => commands::label::run(&ctx, &args),
        Commands::Comment(args) => commands::comment::run(&ctx, &args),
        Commands::Epic(args) => commands::show::run_epic(&ctx, &args),
        Commands::Sync => commands::sync_cmd::run(&ctx),
        Commands::Inbox(args) => commands::inbox::run(&ctx, &args),
        Commands::Decision(args) => commands::decision::run(&ctx, &args),
        Commands::Gate(args) => commands::gate::run(&ctx, &args),
        Commands::Formula(args) => commands::formula::run(&ctx, &args),
        Commands::Bus(args) => commands::bus_cmd::run(&ctx, &args),
        Commands::Daemon(args) => commands::daemon_cmd::run(&ctx, &args),
        Commands::Doctor => commands::doctor::run(&ctx),
        Commands::Cleanup(args) => commands::cleanup::run(&ctx, &args),
        Commands::MergeFile(args) => commands::merge_file::run(&args),
    };

    if let Err(e) = result {
        report_failure(&ctx, &e);
        std::process::exit(e.exit_code());
    }
}

/// Prints a failed command: one line of category + message on stderr, the
/// hint below it. JSON mode emits the error envelope instead.
fn report_failure(ctx: &RuntimeContext, error: &CliError) {
    if ctx.json {
        let envelope = serde_json::json!({
            "ok": false,
            "error": {
                "kind": error.info().kind,
                "message": error.info().message,
                "hint": error.info().hint,
            },
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&envelope).unwrap_or_default()
        );
    } else {
        eprintln!("error[{}]: {}", error.info().kind, error.info().message);
        if let Some(ref hint) = error.info().hint {
            eprintln!("  hint: {hint}");
        }
    }
}
