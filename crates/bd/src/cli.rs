//! clap definitions for the `bd` CLI.

use clap::{Args, Parser, Subcommand};

/// Dependency-aware, git-backed issue tracker for agent workflows.
#[derive(Parser)]
#[command(name = "bd", version, about, max_term_width = 100)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args)]
pub struct GlobalArgs {
    /// Actor name recorded on events (defaults to BD_ACTOR / git user).
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a beads workspace in the current directory.
    Init(InitArgs),
    /// Create an issue.
    Create(CreateArgs),
    /// Update fields on an issue.
    Update(UpdateArgs),
    /// Close an issue.
    Close(CloseArgs),
    /// Reopen a closed issue.
    Reopen(CloseArgs),
    /// Show one issue with its relations and recent events.
    Show(ShowArgs),
    /// List issues.
    List(ListArgs),
    /// Show ready work (open, unblocked, non-template).
    Ready(ReadyArgs),
    /// Show blocked issues and their blockers.
    Blocked,
    /// Manage dependency edges.
    Dep(DepArgs),
    /// Manage labels.
    Label(LabelArgs),
    /// Add or list comments.
    Comment(CommentArgs),
    /// Show an epic rollup.
    Epic(ShowArgs),
    /// Export, commit, pull, import, push the federation files.
    Sync,
    /// Agent inbox operations.
    Inbox(InboxArgs),
    /// Decision points.
    Decision(DecisionArgs),
    /// Gates (session markers and DB gates).
    Gate(GateArgs),
    /// Workflow formulas.
    Formula(FormulaArgs),
    /// Event bus operations.
    Bus(BusArgs),
    /// Daemon management.
    Daemon(DaemonArgs),
    /// Consistency checks and derived-state repair.
    Doctor,
    /// Tombstone an issue; it never re-appears in any query.
    Cleanup(CleanupArgs),
    /// Git merge driver entry point (union merge of JSONL files).
    #[command(hide = true)]
    MergeFile(MergeFileArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Issue id prefix for this workspace.
    #[arg(long, default_value = "bd")]
    pub prefix: String,

    /// Storage backend: embedded or versioned.
    #[arg(long, default_value = "embedded")]
    pub backend: String,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Issue title.
    pub title: String,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Issue type (task, bug, feature, epic, ...).
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Priority 0-4 (0 highest).
    #[arg(short, long)]
    pub priority: Option<i32>,

    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels, repeatable.
    #[arg(short, long)]
    pub label: Vec<String>,

    /// Blocking dependencies: this issue depends on the given ids.
    #[arg(long)]
    pub depends_on: Vec<String>,

    /// Parent epic (adds a parent-child edge).
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub priority: Option<i32>,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    #[arg(short, long)]
    pub assignee: Option<String>,
}

#[derive(Args)]
pub struct CloseArgs {
    pub id: String,

    /// Close reason.
    #[arg(short, long)]
    pub reason: Option<String>,

    /// Close even if open work still depends on this issue.
    #[arg(long)]
    pub force: bool,

    /// Session identifier recorded on the close event.
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<String>,

    /// Include closed issues.
    #[arg(long)]
    pub all: bool,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    #[arg(short, long)]
    pub priority: Option<i32>,

    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Full-text filter over title and description.
    #[arg(long)]
    pub text: Option<String>,

    /// AND label filter, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,

    /// OR label filter, comma-separated.
    #[arg(long = "label-any", value_delimiter = ',')]
    pub label_any: Vec<String>,

    /// Resume after this id (cursor pagination).
    #[arg(long)]
    pub after: Option<String>,

    #[arg(short = 'n', long)]
    pub limit: Option<i32>,
}

#[derive(Args)]
pub struct ReadyArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<i32>,

    #[arg(short, long)]
    pub assignee: Option<String>,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Restrict to children of this epic.
    #[arg(long)]
    pub epic: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,
}

#[derive(Args)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommands,
}

#[derive(Subcommand)]
pub enum DepCommands {
    /// Add an edge: FROM depends on TO.
    Add {
        from: String,
        to: String,
        /// Edge type: blocks, parent-child, related, discovered-from.
        #[arg(short = 't', long = "type", default_value = "blocks")]
        dep_type: String,
    },
    /// Remove an edge.
    Remove { from: String, to: String },
}

#[derive(Args)]
pub struct LabelArgs {
    #[command(subcommand)]
    pub command: LabelCommands,
}

#[derive(Subcommand)]
pub enum LabelCommands {
    /// Add a label to an issue.
    Add { id: String, label: String },
    /// Remove a label from an issue.
    Remove { id: String, label: String },
    /// List labels with usage counts.
    List,
}

#[derive(Args)]
pub struct CommentArgs {
    #[command(subcommand)]
    pub command: CommentCommands,
}

#[derive(Subcommand)]
pub enum CommentCommands {
    /// Add a comment.
    Add { id: String, text: String },
    /// List comments on an issue.
    List { id: String },
}

#[derive(Args)]
pub struct InboxArgs {
    #[command(subcommand)]
    pub command: InboxCommands,
}

#[derive(Subcommand)]
pub enum InboxCommands {
    /// Push a notification to an agent (all agents when --to is omitted).
    Push {
        /// Message body.
        content: String,

        /// Recipient agent name.
        #[arg(long)]
        to: Option<String>,

        /// Message type (alert, mail, ...).
        #[arg(short = 't', long = "type")]
        msg_type: Option<String>,

        /// Idempotency key; duplicate pushes are no-ops.
        #[arg(long)]
        dedup_key: String,

        #[arg(short, long)]
        priority: Option<i32>,

        /// Expiry in seconds from now.
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// List an agent's messages, newest first.
    List {
        agent: String,
        #[arg(short = 'n', long, default_value = "50")]
        limit: i32,
    },
    /// Drain pending notifications for a session.
    Drain {
        agent: String,
        #[arg(long)]
        session: String,
        /// Also reconcile with the database (SessionStart semantics).
        #[arg(long)]
        session_start: bool,
    },
}

#[derive(Args)]
pub struct DecisionArgs {
    #[command(subcommand)]
    pub command: DecisionCommands,
}

#[derive(Subcommand)]
pub enum DecisionCommands {
    /// Create a decision point.
    Create {
        title: String,

        #[arg(long)]
        prompt: Option<String>,

        /// Options as id=label pairs, repeatable.
        #[arg(short, long)]
        option: Vec<String>,

        /// Default option id applied on expiry.
        #[arg(long)]
        default: Option<String>,

        /// Agent notified when the decision resolves.
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// Respond to a decision (selected option and/or free text).
    Respond {
        id: String,

        #[arg(short, long)]
        selected: Option<String>,

        #[arg(short, long)]
        text: Option<String>,
    },
    /// List pending decisions.
    List,
    /// Show one decision.
    Show { id: String },
}

#[derive(Args)]
pub struct GateArgs {
    #[command(subcommand)]
    pub command: GateCommands,
}

#[derive(Subcommand)]
pub enum GateCommands {
    /// Evaluate gates now (DB gates; session gates with --session).
    Check {
        #[arg(long)]
        session: Option<String>,
    },
    /// Register a gate.
    Register {
        /// Gate title (DB gates).
        title: String,

        /// Await type: gh:run, gh:pr, timer, human, mail, bead, decision.
        #[arg(long, default_value = "human")]
        await_type: String,

        /// Identifier of the awaited thing.
        #[arg(long)]
        await_id: Option<String>,

        /// Timer timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Agents notified on resolution, repeatable.
        #[arg(short, long)]
        waiter: Vec<String>,

        /// Register an ephemeral session gate instead of a DB gate.
        #[arg(long)]
        session: Option<String>,

        /// Strict session gates block; soft ones warn.
        #[arg(long)]
        strict: bool,
    },
    /// Resolve a gate (close a DB gate or mark a session gate done).
    Resolve {
        id: String,

        #[arg(short, long)]
        reason: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Args)]
pub struct FormulaArgs {
    #[command(subcommand)]
    pub command: FormulaCommands,
}

#[derive(Subcommand)]
pub enum FormulaCommands {
    /// Import a TOML formula definition as a template.
    Import {
        /// Path to the TOML file.
        file: String,
    },
    /// List imported formulas.
    List,
    /// Show a formula by name or id.
    Show { name: String },
}

#[derive(Args)]
pub struct BusArgs {
    #[command(subcommand)]
    pub command: BusCommands,
}

#[derive(Subcommand)]
pub enum BusCommands {
    /// Emit a lifecycle event through the handler chain.
    Emit {
        /// Event type (SessionStart, Stop, ...).
        event: String,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        agent: Option<String>,

        /// JSON payload.
        #[arg(long)]
        payload: Option<String>,
    },
    /// Register an external handler subprocess.
    Register {
        id: String,

        /// Comma-separated event types.
        #[arg(long)]
        events: String,

        /// Shell command; receives the event JSON on stdin.
        #[arg(long)]
        command: String,

        #[arg(long, default_value = "100")]
        priority: i32,

        #[arg(long, default_value = "10")]
        timeout: i64,
    },
    /// Unregister an external handler.
    Unregister { id: String },
    /// List registered external handlers.
    Handlers,
}

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommands,
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Run the daemon in the foreground (used by autostart).
    Run,
    /// Show daemon status.
    Status,
    /// Stop and restart the workspace daemon.
    Restart,
    /// Show recent daemon log material.
    Logs,
}

#[derive(Args)]
pub struct CleanupArgs {
    /// Issue to tombstone.
    pub id: String,
}

#[derive(Args)]
pub struct MergeFileArgs {
    /// %A: ours (receives the merge result).
    pub ours: String,
    /// %O: base.
    pub base: String,
    /// %B: theirs.
    pub theirs: String,
}
