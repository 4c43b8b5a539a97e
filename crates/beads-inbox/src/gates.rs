//! Gates: session markers and DB-backed await conditions.
//!
//! Session gates are ephemeral marker files under
//! `.runtime/gates/<session>/`; they exist only for the lifetime of one
//! agent session. DB gates are issues of type `gate` whose metadata names
//! an await condition; the daemon evaluates them on a timer and resolves a
//! gate by closing its issue and notifying every waiter.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use beads_core::enums::{AwaitType, IssueType, Status};
use beads_core::inbox::InboxMessage;
use beads_core::issue::Issue;
use beads_core::metadata::GateMeta;
use beads_storage::Storage;

use crate::{InboxError, Result};

// ---------------------------------------------------------------------------
// Session gates (ephemeral markers)
// ---------------------------------------------------------------------------

/// A session gate registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGate {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Strict gates block the stop; soft gates warn.
    #[serde(default)]
    pub strict: bool,
}

/// Session gate registry: a JSON manifest plus one marker file per
/// satisfied gate, both under `.runtime/gates/<session>/`.
#[derive(Debug, Clone)]
pub struct SessionGates {
    dir: PathBuf,
}

const MANIFEST: &str = "gates.json";

impl SessionGates {
    /// Gate registry for one session directory.
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: session_dir.into(),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST)
    }

    fn marker_path(&self, gate_id: &str) -> PathBuf {
        self.dir.join(gate_id)
    }

    fn load_manifest(&self) -> Result<Vec<SessionGate>> {
        match std::fs::read_to_string(self.manifest_path()) {
            Ok(text) => Ok(serde_json::from_str(&text).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_manifest(&self, gates: &[SessionGate]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.manifest_path(), serde_json::to_string(gates)?)?;
        Ok(())
    }

    /// Registers a gate for the session.
    pub fn register(&self, gate: SessionGate) -> Result<()> {
        let mut gates = self.load_manifest()?;
        gates.retain(|g| g.id != gate.id);
        gates.push(gate);
        self.save_manifest(&gates)
    }

    /// Satisfies a gate by creating its marker file.
    pub fn resolve(&self, gate_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.marker_path(gate_id), b"")?;
        Ok(())
    }

    /// Returns `true` if the gate's marker file exists.
    pub fn is_satisfied(&self, gate_id: &str) -> bool {
        self.marker_path(gate_id).is_file()
    }

    /// Registered gates whose marker is absent.
    pub fn unresolved(&self) -> Result<Vec<SessionGate>> {
        Ok(self
            .load_manifest()?
            .into_iter()
            .filter(|g| !self.is_satisfied(&g.id))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// GitHub probe (gh:run / gh:pr awaits)
// ---------------------------------------------------------------------------

/// External check used by `gh:run` / `gh:pr` gates. A trait so tests and
/// offline daemons can stub the network.
pub trait GithubProbe: Send + Sync {
    /// Has the Actions run concluded successfully?
    fn run_succeeded(&self, repo: &str, run_id: &str) -> std::result::Result<bool, String>;

    /// Is the PR merged?
    fn pr_merged(&self, repo: &str, pr_number: &str) -> std::result::Result<bool, String>;
}

/// ureq-backed probe against api.github.com.
pub struct HttpGithubProbe {
    token: Option<String>,
}

impl HttpGithubProbe {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    fn get(&self, url: &str) -> std::result::Result<serde_json::Value, String> {
        let mut request = ureq::get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "beads");
        if let Some(ref token) = self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        request
            .call()
            .map_err(|e| e.to_string())?
            .body_mut()
            .read_json::<serde_json::Value>()
            .map_err(|e| e.to_string())
    }
}

impl GithubProbe for HttpGithubProbe {
    fn run_succeeded(&self, repo: &str, run_id: &str) -> std::result::Result<bool, String> {
        let body = self.get(&format!(
            "https://api.github.com/repos/{repo}/actions/runs/{run_id}"
        ))?;
        Ok(body["status"] == "completed" && body["conclusion"] == "success")
    }

    fn pr_merged(&self, repo: &str, pr_number: &str) -> std::result::Result<bool, String> {
        let body = self.get(&format!(
            "https://api.github.com/repos/{repo}/pulls/{pr_number}"
        ))?;
        Ok(body["merged"] == true)
    }
}

// ---------------------------------------------------------------------------
// DB gate evaluation
// ---------------------------------------------------------------------------

/// Outcome of evaluating one gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDisposition {
    /// Condition met; resolve the gate with this reason.
    Resolve(String),
    /// Condition not yet met.
    Pending,
}

/// Evaluates one gate issue against its await condition.
///
/// Upstream failures return `Err`: the gate stays open and the caller
/// retries with backoff on the next timer pass.
pub fn evaluate_gate(
    store: &dyn Storage,
    probe: &dyn GithubProbe,
    gate: &Issue,
    now: DateTime<Utc>,
) -> Result<GateDisposition> {
    let meta = GateMeta::from_issue(gate).unwrap_or_default();
    match meta.await_type {
        AwaitType::Timer => {
            match meta.deadline(gate.created_at) {
                Some(deadline) if now >= deadline => Ok(GateDisposition::Resolve(format!(
                    "timer elapsed at {deadline}"
                ))),
                // A timer gate without a timeout never fires; validation
                // rejects new ones, imported ones stay pending.
                _ => Ok(GateDisposition::Pending),
            }
        }
        AwaitType::Human => Ok(GateDisposition::Pending),
        AwaitType::Decision => Ok(GateDisposition::Pending),
        AwaitType::Bead => match store.get_issue(&meta.await_id) {
            Ok(target) if target.status == Status::Closed => Ok(GateDisposition::Resolve(
                format!("bead {} closed", meta.await_id),
            )),
            Ok(_) => Ok(GateDisposition::Pending),
            // A tombstoned or vanished bead counts as satisfied.
            Err(e) if e.is_not_found() => Ok(GateDisposition::Resolve(format!(
                "bead {} gone",
                meta.await_id
            ))),
            Err(e) => Err(e.into()),
        },
        AwaitType::Mail => {
            let inbox = store.inbox_list(&gate_waiter(&meta), 200)?;
            if inbox.iter().any(|m| m.dedup_key == meta.await_id) {
                Ok(GateDisposition::Resolve(format!(
                    "mail {} arrived",
                    meta.await_id
                )))
            } else {
                Ok(GateDisposition::Pending)
            }
        }
        AwaitType::GhRun => {
            let (repo, run_id) = split_gh_ref(&meta.await_id);
            match probe.run_succeeded(repo, run_id) {
                Ok(true) => Ok(GateDisposition::Resolve(format!(
                    "gh run {} succeeded",
                    meta.await_id
                ))),
                Ok(false) => Ok(GateDisposition::Pending),
                Err(e) => Err(InboxError::External(e)),
            }
        }
        AwaitType::GhPr => {
            let (repo, pr) = split_gh_ref(&meta.await_id);
            match probe.pr_merged(repo, pr) {
                Ok(true) => Ok(GateDisposition::Resolve(format!(
                    "gh pr {} merged",
                    meta.await_id
                ))),
                Ok(false) => Ok(GateDisposition::Pending),
                Err(e) => Err(InboxError::External(e)),
            }
        }
        AwaitType::Custom(_) => Ok(GateDisposition::Pending),
    }
}

/// First waiter, used as the mailbox owner for mail gates.
fn gate_waiter(meta: &GateMeta) -> String {
    meta.waiters.first().cloned().unwrap_or_default()
}

/// Splits `owner/repo#id` into repo and id parts.
fn split_gh_ref(await_id: &str) -> (&str, &str) {
    match await_id.split_once('#') {
        Some((repo, id)) => (repo, id),
        None => ("", await_id),
    }
}

/// One timer pass over all open DB gates: evaluates each, closes resolved
/// gates, and pushes an inbox notification (dedup key `gate:<id>`) to every
/// waiter. Evaluation errors leave the gate open.
pub fn check_db_gates(
    store: &dyn Storage,
    probe: &dyn GithubProbe,
    now: DateTime<Utc>,
    actor: &str,
) -> Result<Vec<String>> {
    let mut resolved = Vec::new();
    for gate in store.open_gates()? {
        // Decision issues resolve through the respond path, not the timer.
        if gate.issue_type != IssueType::Gate {
            continue;
        }
        match evaluate_gate(store, probe, &gate, now) {
            Ok(GateDisposition::Resolve(reason)) => {
                store.close_issue(&gate.id, &reason, actor, "")?;
                let meta = GateMeta::from_issue(&gate).unwrap_or_default();
                for waiter in &meta.waiters {
                    let mut msg = InboxMessage::new(
                        waiter.clone(),
                        format!("gate {} resolved: {reason}", gate.id),
                        format!("gate:{}", gate.id),
                    );
                    msg.msg_type = "gate".into();
                    msg.source = gate.id.clone();
                    msg.priority = 1;
                    store.inbox_push(&msg)?;
                }
                debug!(gate = %gate.id, %reason, "gate resolved");
                resolved.push(gate.id);
            }
            Ok(GateDisposition::Pending) => {}
            Err(e) => {
                warn!(gate = %gate.id, error = %e, "gate evaluation failed; will retry");
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    struct StubProbe {
        run_result: std::result::Result<bool, String>,
    }

    impl GithubProbe for StubProbe {
        fn run_succeeded(&self, _repo: &str, _run_id: &str) -> std::result::Result<bool, String> {
            self.run_result.clone()
        }
        fn pr_merged(&self, _repo: &str, _pr: &str) -> std::result::Result<bool, String> {
            Ok(false)
        }
    }

    fn pending_probe() -> StubProbe {
        StubProbe {
            run_result: Ok(false),
        }
    }

    fn gate_issue(store: &SqliteStore, id: &str, meta: GateMeta) -> Issue {
        let mut issue = IssueBuilder::new(format!("Gate {id}"))
            .id(id)
            .issue_type(IssueType::Gate)
            .build();
        issue.set_metadata(&meta).unwrap();
        store.create_issue_impl(&issue, "mayor").unwrap();
        store.get_issue_impl(id).unwrap()
    }

    #[test]
    fn session_gates_block_until_marker() {
        let dir = tempfile::tempdir().unwrap();
        let gates = SessionGates::new(dir.path().join("sess-1"));
        gates
            .register(SessionGate {
                id: "tests-pass".into(),
                description: "run the test suite".into(),
                strict: true,
            })
            .unwrap();

        assert_eq!(gates.unresolved().unwrap().len(), 1);
        gates.resolve("tests-pass").unwrap();
        assert!(gates.is_satisfied("tests-pass"));
        assert!(gates.unresolved().unwrap().is_empty());
    }

    #[test]
    fn timer_gate_resolves_after_deadline() {
        let store = SqliteStore::open_in_memory().unwrap();
        let gate = gate_issue(
            &store,
            "bd-g1",
            GateMeta {
                await_type: AwaitType::Timer,
                timeout_secs: Some(60),
                ..Default::default()
            },
        );

        let probe = pending_probe();
        let before = evaluate_gate(&store, &probe, &gate, gate.created_at).unwrap();
        assert_eq!(before, GateDisposition::Pending);

        let later = gate.created_at + chrono::Duration::seconds(61);
        assert!(matches!(
            evaluate_gate(&store, &probe, &gate, later).unwrap(),
            GateDisposition::Resolve(_)
        ));
    }

    #[test]
    fn human_gate_never_auto_resolves() {
        let store = SqliteStore::open_in_memory().unwrap();
        let gate = gate_issue(
            &store,
            "bd-g2",
            GateMeta {
                await_type: AwaitType::Human,
                ..Default::default()
            },
        );
        let later = gate.created_at + chrono::Duration::days(365);
        assert_eq!(
            evaluate_gate(&store, &pending_probe(), &gate, later).unwrap(),
            GateDisposition::Pending
        );
    }

    #[test]
    fn bead_gate_follows_target() {
        let store = SqliteStore::open_in_memory().unwrap();
        let target = IssueBuilder::new("Target").id("bd-target").build();
        store.create_issue_impl(&target, "mayor").unwrap();
        let gate = gate_issue(
            &store,
            "bd-g3",
            GateMeta {
                await_type: AwaitType::Bead,
                await_id: "bd-target".into(),
                ..Default::default()
            },
        );

        let probe = pending_probe();
        assert_eq!(
            evaluate_gate(&store, &probe, &gate, Utc::now()).unwrap(),
            GateDisposition::Pending
        );

        store.close_issue_impl("bd-target", "done", "mayor", "").unwrap();
        assert!(matches!(
            evaluate_gate(&store, &probe, &gate, Utc::now()).unwrap(),
            GateDisposition::Resolve(_)
        ));
    }

    #[test]
    fn gh_error_keeps_gate_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        let gate = gate_issue(
            &store,
            "bd-g4",
            GateMeta {
                await_type: AwaitType::GhRun,
                await_id: "acme/widgets#123".into(),
                waiters: vec!["mayor".into()],
                ..Default::default()
            },
        );
        let probe = StubProbe {
            run_result: Err("503 from api.github.com".into()),
        };
        assert!(evaluate_gate(&store, &probe, &gate, Utc::now()).is_err());

        // The timer pass logs and keeps going.
        let resolved = check_db_gates(&store, &probe, Utc::now(), "daemon").unwrap();
        assert!(resolved.is_empty());
        assert_eq!(store.open_gates_impl().unwrap().len(), 1);
    }

    #[test]
    fn resolution_closes_and_notifies_waiters() {
        let store = SqliteStore::open_in_memory().unwrap();
        gate_issue(
            &store,
            "bd-g5",
            GateMeta {
                await_type: AwaitType::GhRun,
                await_id: "acme/widgets#9".into(),
                waiters: vec!["mayor".into(), "deputy".into()],
                ..Default::default()
            },
        );
        let probe = StubProbe {
            run_result: Ok(true),
        };

        let resolved = check_db_gates(&store, &probe, Utc::now(), "daemon").unwrap();
        assert_eq!(resolved, vec!["bd-g5"]);
        assert!(store.open_gates_impl().unwrap().is_empty());

        for waiter in ["mayor", "deputy"] {
            let pending = store.inbox_undelivered_impl(waiter).unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].dedup_key, "gate:bd-g5");
        }

        // A second pass is a no-op (gate closed, dedup keys present).
        let again = check_db_gates(&store, &probe, Utc::now(), "daemon").unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn gh_ref_parsing() {
        assert_eq!(split_gh_ref("acme/widgets#12"), ("acme/widgets", "12"));
        assert_eq!(split_gh_ref("12345"), ("", "12345"));
    }
}
