//! End-to-end CLI integration tests for the `bd` binary.
//!
//! Each test creates its own temporary workspace, initializes it, and
//! drives the `bd` binary as a subprocess via `assert_cmd`. Operations run
//! in-process (`BEADS_NO_DAEMON=1`) so tests stay hermetic: no sockets, no
//! background daemons.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Builds a `Command` targeting the cargo-built `bd` binary.
fn bd(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bd").unwrap();
    cmd.current_dir(tmp.path())
        .env("BEADS_NO_DAEMON", "1")
        .env("BD_ACTOR", "tester")
        .env_remove("BEADS_DIR")
        .env_remove("BEADS_SOCKET");
    cmd
}

/// Initializes a fresh workspace and returns its handle.
fn init_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    bd(&tmp)
        .args(["init", "--prefix", "t", "--quiet"])
        .assert()
        .success();
    tmp
}

/// Creates an issue and returns its id (parsed from `--json` output).
fn create_issue(tmp: &TempDir, title: &str, extra_args: &[&str]) -> String {
    let mut args = vec!["create", title, "--json"];
    args.extend_from_slice(extra_args);
    let output = bd(tmp).args(&args).output().unwrap();
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json["id"].as_str().unwrap().to_string()
}

fn json_output(tmp: &TempDir, args: &[&str]) -> serde_json::Value {
    let output = bd(tmp).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// Flow 1: lifecycle
// ---------------------------------------------------------------------------

#[test]
fn flow1_full_lifecycle() {
    let tmp = init_workspace();

    let id1 = create_issue(&tmp, "Bug: login broken", &["-t", "bug", "-p", "0"]);
    let id2 = create_issue(&tmp, "Feature: dark mode", &["-t", "feature", "-p", "2"]);
    let _id3 = create_issue(&tmp, "Task: update docs", &["-p", "3"]);
    assert!(id1.starts_with("t-"));

    let list = json_output(&tmp, &["list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 3);

    // Update then close then reopen.
    bd(&tmp)
        .args(["update", &id1, "--status", "in_progress"])
        .assert()
        .success();
    let shown = json_output(&tmp, &["show", &id1, "--json"]);
    assert_eq!(shown["status"], "in_progress");

    bd(&tmp)
        .args(["close", &id1, "-r", "Fixed"])
        .assert()
        .success();
    let list = json_output(&tmp, &["list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 2);

    let all = json_output(&tmp, &["list", "--all", "--json"]);
    assert_eq!(all.as_array().unwrap().len(), 3);

    bd(&tmp).args(["reopen", &id1]).assert().success();
    let shown = json_output(&tmp, &["show", &id1, "--json"]);
    assert_eq!(shown["status"], "open");

    let _ = id2;
}

// ---------------------------------------------------------------------------
// Flow 2: readiness gating and cycles
// ---------------------------------------------------------------------------

#[test]
fn flow2_readiness_and_cycles() {
    let tmp = init_workspace();

    let a = create_issue(&tmp, "A", &[]);
    let b = create_issue(&tmp, "B", &[]);
    let c = create_issue(&tmp, "C", &[]);

    bd(&tmp).args(["dep", "add", &b, &a]).assert().success();
    bd(&tmp).args(["dep", "add", &c, &b]).assert().success();

    let ready = json_output(&tmp, &["ready", "--json"]);
    let ids: Vec<&str> = ready
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![a.as_str()]);

    // Cycle rejected with exit code 1 and the cycle category.
    bd(&tmp)
        .args(["dep", "add", &a, &c])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));

    // Close A: B becomes ready; close B: C becomes ready.
    bd(&tmp)
        .args(["close", &a, "-r", "done", "--force"])
        .assert()
        .success();
    let ready = json_output(&tmp, &["ready", "--json"]);
    assert_eq!(ready[0]["id"], b.as_str());

    bd(&tmp)
        .args(["close", &b, "-r", "done", "--force"])
        .assert()
        .success();
    let ready = json_output(&tmp, &["ready", "--json"]);
    assert_eq!(ready[0]["id"], c.as_str());
}

#[test]
fn close_safety_policy_exit_code() {
    let tmp = init_workspace();
    let base = create_issue(&tmp, "Base", &[]);
    let dependent = create_issue(&tmp, "Dependent", &[]);
    bd(&tmp)
        .args(["dep", "add", &dependent, &base])
        .assert()
        .success();

    // Closing the blocker without --force violates close-safety: exit 3.
    bd(&tmp)
        .args(["close", &base, "-r", "nope"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("policy_violation"));

    bd(&tmp)
        .args(["close", &base, "-r", "ok", "--force"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// Flow 3: labels
// ---------------------------------------------------------------------------

#[test]
fn flow3_label_filters() {
    let tmp = init_workspace();
    let a = create_issue(&tmp, "Tagged A", &[]);
    let b = create_issue(&tmp, "Tagged B", &[]);

    bd(&tmp).args(["label", "add", &a, "ci"]).assert().success();
    bd(&tmp).args(["label", "add", &a, "urgent"]).assert().success();
    bd(&tmp).args(["label", "add", &b, "ci"]).assert().success();

    // --label is AND; --label-any is OR.
    let both = json_output(&tmp, &["list", "--label", "ci,urgent", "--json"]);
    assert_eq!(both.as_array().unwrap().len(), 1);
    let any = json_output(&tmp, &["list", "--label-any", "ci,urgent", "--json"]);
    assert_eq!(any.as_array().unwrap().len(), 2);

    let counts = json_output(&tmp, &["label", "list", "--json"]);
    let ci = counts
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["label"] == "ci")
        .unwrap();
    assert_eq!(ci["count"], 2);
}

// ---------------------------------------------------------------------------
// Flow 4: federation round-trip between two workspaces
// ---------------------------------------------------------------------------

#[test]
fn flow4_federation_round_trip() {
    let repo1 = init_workspace();
    let id = create_issue(&repo1, "alpha", &["-d", "born in repo one"]);

    // Sync exports (git parts are skipped outside a repo and reported as
    // warnings, not failures).
    bd(&repo1).arg("sync").assert().success();
    let exported = repo1.path().join(".beads/issues.jsonl");
    assert!(exported.exists());

    // Copy the federation file into a second, empty workspace.
    let repo2 = init_workspace();
    std::fs::copy(&exported, repo2.path().join(".beads/issues.jsonl")).unwrap();
    bd(&repo2).arg("sync").assert().success();

    let shown = json_output(&repo2, &["show", &id, "--json"]);
    assert_eq!(shown["title"], "alpha");
    assert_eq!(shown["description"], "born in repo one");

    // Same content hash on both sides.
    let original = json_output(&repo1, &["show", &id, "--json"]);
    assert_eq!(original["content_hash"], shown["content_hash"]);
}

// ---------------------------------------------------------------------------
// Flow 5: inbox delivery
// ---------------------------------------------------------------------------

#[test]
fn flow5_inbox_delivery() {
    let tmp = init_workspace();

    // Push the same dedup key twice: the database keeps one row.
    for _ in 0..2 {
        bd(&tmp)
            .args([
                "inbox",
                "push",
                "ci failed",
                "--to",
                "mayor",
                "--type",
                "alert",
                "--dedup-key",
                "alert:ci:1",
            ])
            .assert()
            .success();
    }
    let listed = json_output(&tmp, &["inbox", "list", "mayor", "--json"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Drain for a session emits exactly one alert.
    let drained = json_output(
        &tmp,
        &[
            "inbox",
            "drain",
            "mayor",
            "--session",
            "sess-1",
            "--session-start",
            "--json",
        ],
    );
    let blocks = drained["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].as_str().unwrap().contains("ci failed"));

    // A second drain is empty.
    let drained = json_output(
        &tmp,
        &[
            "inbox",
            "drain",
            "mayor",
            "--session",
            "sess-1",
            "--session-start",
            "--json",
        ],
    );
    assert!(drained["blocks"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Flow 6: decision resolve
// ---------------------------------------------------------------------------

#[test]
fn flow6_decision_resolve() {
    let tmp = init_workspace();

    let decision = json_output(
        &tmp,
        &[
            "decision",
            "create",
            "Ship it?",
            "--option",
            "a=yes",
            "--option",
            "b=no",
            "--default",
            "a",
            "--requested-by",
            "mayor",
            "--json",
        ],
    );
    let decision_id = decision["id"].as_str().unwrap().to_string();

    // A task blocked on the decision.
    let task = create_issue(&tmp, "Blocked on the call", &[]);
    bd(&tmp)
        .args(["dep", "add", &task, &decision_id])
        .assert()
        .success();
    let ready = json_output(&tmp, &["ready", "--json"]);
    assert!(ready.as_array().unwrap().iter().all(|v| v["id"] != task.as_str()));

    // Respond without selection or text: invalid usage, exit 2.
    bd(&tmp)
        .args(["decision", "respond", &decision_id])
        .assert()
        .failure()
        .code(2);

    bd(&tmp)
        .args(["decision", "respond", &decision_id, "--selected", "a"])
        .assert()
        .success();

    // Requester got exactly one message with the canonical dedup key.
    let inbox = json_output(&tmp, &["inbox", "list", "mayor", "--json"]);
    let rows = inbox.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["dedup_key"], format!("decision:{decision_id}"));

    // Downstream issue became ready.
    let ready = json_output(&tmp, &["ready", "--json"]);
    assert!(ready.as_array().unwrap().iter().any(|v| v["id"] == task.as_str()));

    // No re-responding.
    bd(&tmp)
        .args(["decision", "respond", &decision_id, "--selected", "b"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// Gates, epics, doctor, misc
// ---------------------------------------------------------------------------

#[test]
fn timer_gate_resolves_on_check() {
    let tmp = init_workspace();

    let gate = json_output(
        &tmp,
        &[
            "gate",
            "register",
            "brief pause",
            "--await-type",
            "timer",
            "--timeout",
            "0",
            "--waiter",
            "mayor",
            "--json",
        ],
    );
    let gate_id = gate["id"].as_str().unwrap().to_string();

    // timeout=0 has already elapsed; the check pass resolves it.
    let checked = json_output(&tmp, &["gate", "check", "--json"]);
    let resolved: Vec<&str> = checked["resolved"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(resolved, vec![gate_id.as_str()]);

    // The waiter was notified.
    let inbox = json_output(&tmp, &["inbox", "list", "mayor", "--json"]);
    assert_eq!(inbox[0]["dedup_key"], format!("gate:{gate_id}"));
}

#[test]
fn epic_rollup_command() {
    let tmp = init_workspace();
    let epic = create_issue(&tmp, "Big epic", &["-t", "epic"]);
    let child1 = create_issue(&tmp, "Child 1", &["--parent", &epic]);
    let _child2 = create_issue(&tmp, "Child 2", &["--parent", &epic]);
    bd(&tmp)
        .args(["close", &child1, "-r", "done"])
        .assert()
        .success();

    let rollup = json_output(&tmp, &["epic", &epic, "--json"]);
    assert_eq!(rollup["total_children"], 2);
    assert_eq!(rollup["closed_children"], 1);
}

#[test]
fn doctor_reports_healthy() {
    let tmp = init_workspace();
    create_issue(&tmp, "Something", &[]);
    let report = json_output(&tmp, &["doctor", "--json"]);
    assert_eq!(report["healthy"], true);
}

#[test]
fn cleanup_tombstones_for_good() {
    let tmp = init_workspace();
    let id = create_issue(&tmp, "Ephemeral", &[]);
    bd(&tmp).args(["cleanup", &id]).assert().success();

    bd(&tmp)
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_found"));
    let list = json_output(&tmp, &["list", "--all", "--json"]);
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn formula_import_and_show() {
    let tmp = init_workspace();
    let formula_path = tmp.path().join("release.toml");
    std::fs::write(
        &formula_path,
        "name = \"release\"\n\n[[steps]]\ntitle = \"test\"\n\n[[steps]]\ntitle = \"tag\"\nneeds = [\"test\"]\n",
    )
    .unwrap();

    bd(&tmp)
        .args(["formula", "import", formula_path.to_str().unwrap()])
        .assert()
        .success();
    let shown = json_output(&tmp, &["formula", "show", "release", "--json"]);
    assert_eq!(shown["is_template"], true);

    // Templates never appear in ready output.
    let ready = json_output(&tmp, &["ready", "--json"]);
    assert!(ready.as_array().unwrap().is_empty());
}

#[test]
fn merge_file_unions_lines() {
    let repo1 = init_workspace();
    let repo2 = init_workspace();
    let i1 = create_issue(&repo1, "from repo one", &[]);
    let i2 = create_issue(&repo2, "from repo two", &[]);
    bd(&repo1).arg("sync").assert().success();
    bd(&repo2).arg("sync").assert().success();

    // Merge repo2's file into repo1's with the merge driver entry point.
    let ours = repo1.path().join(".beads/issues.jsonl");
    let theirs = repo2.path().join(".beads/issues.jsonl");
    let base = repo1.path().join("base.jsonl");
    std::fs::write(&base, "").unwrap();
    bd(&repo1)
        .args([
            "merge-file",
            ours.to_str().unwrap(),
            base.to_str().unwrap(),
            theirs.to_str().unwrap(),
        ])
        .assert()
        .success();

    let merged = std::fs::read_to_string(&ours).unwrap();
    assert_eq!(merged.lines().count(), 2);

    // A third empty workspace imports both.
    let repo3 = init_workspace();
    std::fs::copy(&ours, repo3.path().join(".beads/issues.jsonl")).unwrap();
    bd(&repo3).arg("sync").assert().success();
    let list = json_output(&repo3, &["list", "--json"]);
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&i1.as_str()));
    assert!(ids.contains(&i2.as_str()));
}

#[test]
fn usage_errors_exit_2() {
    let tmp = init_workspace();
    // Unknown flag: clap reports usage error with exit code 2.
    bd(&tmp).args(["list", "--no-such-flag"]).assert().code(2);
}

#[test]
fn init_twice_fails() {
    let tmp = init_workspace();
    bd(&tmp)
        .args(["init", "--prefix", "t"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("already initialized"));
}
