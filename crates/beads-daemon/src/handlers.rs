//! RPC operation handlers.
//!
//! One function per operation class, all funneled through
//! [`handle_request`]. The daemon's server wraps this dispatcher with write
//! serialization; the no-daemon testing mode calls it in-process. Policy
//! (version floor, close-safety, single-writer) is enforced here so both
//! paths behave identically.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use beads_bus::external::reload_external_handlers;
use beads_bus::stream::{DECISIONS_SUBJECT, HOOKS_SUBJECT, agent_subject};
use beads_bus::{HookEvent, HookEventType};
use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, IssueType, Status};
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::inbox::InboxMessage;
use beads_core::issue::{Issue, IssueBuilder};
use beads_core::metadata::{DecisionOption, FormulaMeta, GateMeta};
use beads_inbox::gates::{HttpGithubProbe, SessionGate, SessionGates};
use beads_inbox::{InboxError, MergeBuffer, decision, drain_session, gates};
use beads_storage::{BusHandlerRow, IssueUpdates, StorageError};

use crate::context::DaemonContext;
use crate::protocol::{PROTOCOL_VERSION, Request, Response, RpcErrorInfo};

/// Operations that mutate state; the server funnels these through the
/// single writer thread.
pub fn is_write_op(op: &str) -> bool {
    matches!(
        op,
        "create"
            | "update"
            | "close"
            | "reopen"
            | "tombstone"
            | "dep.add"
            | "dep.remove"
            | "label.add"
            | "label.remove"
            | "comment.add"
            | "inbox.push"
            | "inbox.drain"
            | "decision.create"
            | "decision.respond"
            | "gate.register"
            | "gate.resolve"
            | "gate.check"
            | "formula.import"
            | "bus.register"
            | "bus.unregister"
            | "sync"
            | "doctor"
    )
}

/// Dispatches one request.
pub fn handle_request(ctx: &DaemonContext, request: &Request) -> Response {
    // Version floor: clients older than the configured floor are rejected.
    if request.version < ctx.config.daemon.protocol_version_floor {
        return Response::failure(
            RpcErrorInfo::new(
                "policy_violation",
                format!(
                    "client protocol version {} is below the floor {}",
                    request.version, ctx.config.daemon.protocol_version_floor
                ),
            )
            .with_hint("upgrade the bd binary"),
        );
    }

    let result = match request.op.as_str() {
        "create" => op_create(ctx, &request.payload),
        "update" => op_update(ctx, &request.payload),
        "close" => op_close(ctx, &request.payload),
        "reopen" => op_reopen(ctx, &request.payload),
        "tombstone" => op_tombstone(ctx, &request.payload),
        "show" => op_show(ctx, &request.payload),
        "list" => op_list(ctx, &request.payload),
        "ready" => op_ready(ctx, &request.payload),
        "blocked" => op_blocked(ctx, &request.payload),
        "epic.rollup" => op_epic_rollup(ctx, &request.payload),
        "dep.add" => op_dep_add(ctx, &request.payload),
        "dep.remove" => op_dep_remove(ctx, &request.payload),
        "label.add" => op_label_add(ctx, &request.payload),
        "label.remove" => op_label_remove(ctx, &request.payload),
        "label.list" => op_label_list(ctx),
        "comment.add" => op_comment_add(ctx, &request.payload),
        "comment.list" => op_comment_list(ctx, &request.payload),
        "inbox.push" => op_inbox_push(ctx, &request.payload),
        "inbox.list" => op_inbox_list(ctx, &request.payload),
        "inbox.drain" => op_inbox_drain(ctx, &request.payload),
        "decision.create" => op_decision_create(ctx, &request.payload),
        "decision.respond" => op_decision_respond(ctx, &request.payload),
        "decision.list" => op_decision_list(ctx),
        "decision.show" => op_show(ctx, &request.payload),
        "gate.register" => op_gate_register(ctx, &request.payload),
        "gate.resolve" => op_gate_resolve(ctx, &request.payload),
        "gate.check" => op_gate_check(ctx, &request.payload),
        "formula.import" => op_formula_import(ctx, &request.payload),
        "formula.list" => op_formula_list(ctx),
        "formula.show" => op_formula_show(ctx, &request.payload),
        "bus.emit" => op_bus_emit(ctx, &request.payload),
        "bus.register" => op_bus_register(ctx, &request.payload),
        "bus.unregister" => op_bus_unregister(ctx, &request.payload),
        "bus.handlers" => op_bus_handlers(ctx),
        "daemon.status" => op_daemon_status(ctx),
        "sync" => op_sync(ctx, &request.payload),
        "doctor" => op_doctor(ctx),
        other => Err(OpError::Invalid(format!("unknown operation: {other}"))),
    };

    match result {
        Ok(payload) => Response::success(payload),
        Err(e) => Response::failure(e.into_info()),
    }
}

// ---------------------------------------------------------------------------
// Operation error
// ---------------------------------------------------------------------------

/// Internal error type so handlers can bail with `?` from several sources.
pub enum OpError {
    Storage(StorageError),
    Invalid(String),
    Policy(String),
    External(String),
}

impl OpError {
    fn into_info(self) -> RpcErrorInfo {
        match self {
            Self::Storage(e) => RpcErrorInfo::from(&e),
            Self::Invalid(message) => RpcErrorInfo::new("invalid", message),
            Self::Policy(message) => RpcErrorInfo::new("policy_violation", message),
            Self::External(message) => RpcErrorInfo::new("external", message),
        }
    }
}

impl From<StorageError> for OpError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<InboxError> for OpError {
    fn from(e: InboxError) -> Self {
        match e {
            InboxError::Storage(inner) => Self::Storage(inner),
            InboxError::Validation(inner) => Self::Invalid(inner.to_string()),
            InboxError::External(message) => Self::External(message),
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl From<crate::DaemonError> for OpError {
    fn from(e: crate::DaemonError) -> Self {
        match e {
            crate::DaemonError::Storage(inner) => Self::Storage(inner),
            other => Self::External(other.to_string()),
        }
    }
}

type OpResult = std::result::Result<Value, OpError>;

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn require_str<'a>(payload: &'a Value, key: &str) -> std::result::Result<&'a str, OpError> {
    str_field(payload, key).ok_or_else(|| OpError::Invalid(format!("missing field: {key}")))
}

fn actor_of(payload: &Value) -> String {
    str_field(payload, "actor").unwrap_or("unknown").to_string()
}

fn str_list(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Serializes an issue with its labels populated.
fn issue_view(ctx: &DaemonContext, mut issue: Issue) -> OpResult {
    issue.labels = ctx.store.get_labels(&issue.id)?;
    let mut value = serde_json::to_value(&issue).map_err(|e| OpError::Invalid(e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.insert("content_hash".into(), Value::String(issue.content_hash.clone()));
    }
    Ok(value)
}

fn issue_views(ctx: &DaemonContext, issues: Vec<Issue>) -> OpResult {
    // Labels resolve in bulk; the storage layer batches the IN-clauses.
    let ids: Vec<String> = issues.iter().map(|i| i.id.clone()).collect();
    let mut labels = ctx.store.get_labels_for_issues(&ids)?;
    let views: Vec<Value> = issues
        .into_iter()
        .map(|mut issue| {
            issue.labels = labels.remove(&issue.id).unwrap_or_default();
            serde_json::to_value(&issue).unwrap_or(Value::Null)
        })
        .collect();
    Ok(Value::Array(views))
}

// ---------------------------------------------------------------------------
// Issue CRUD
// ---------------------------------------------------------------------------

fn op_create(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let title = require_str(payload, "title")?;
    let description = str_field(payload, "description").unwrap_or("");

    let id = match str_field(payload, "id") {
        Some(id) => id.to_string(),
        None => ctx.generate_issue_id(title, description, &actor)?,
    };

    let mut builder = IssueBuilder::new(title)
        .id(id.as_str())
        .description(description)
        .created_by(actor.as_str());
    if let Some(type_str) = str_field(payload, "type") {
        builder = builder.issue_type(IssueType::from(type_str).normalize());
    }
    if let Some(priority) = payload.get("priority").and_then(Value::as_i64) {
        builder = builder.priority(priority as i32);
    }
    if let Some(assignee) = str_field(payload, "assignee") {
        builder = builder.assignee(assignee);
    }
    if let Some(is_template) = payload.get("is_template").and_then(Value::as_bool) {
        builder = builder.is_template(is_template);
    }
    let mut issue = builder.build();
    if let Some(metadata) = payload.get("metadata").filter(|m| !m.is_null()) {
        issue
            .set_metadata(metadata)
            .map_err(|e| OpError::Invalid(e.to_string()))?;
    }

    beads_core::validation::validate(&issue).map_err(|e| OpError::Invalid(e.to_string()))?;

    let labels = str_list(payload, "labels");
    let deps: Vec<(String, DependencyType)> = payload
        .get("deps")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|d| {
                    let target = d.get("depends_on").and_then(Value::as_str)?;
                    let dep_type = d
                        .get("type")
                        .and_then(Value::as_str)
                        .map(DependencyType::from)
                        .unwrap_or_default();
                    Some((target.to_string(), dep_type))
                })
                .collect()
        })
        .unwrap_or_default();

    ctx.store.run_in_transaction(&|tx| {
        tx.create_issue(&issue, &actor)?;
        for label in &labels {
            tx.add_label(&issue.id, label, &actor)?;
        }
        for (target, dep_type) in &deps {
            tx.add_dependency(
                &Dependency::new(issue.id.as_str(), target.as_str(), dep_type.clone(), &actor),
                &actor,
            )?;
        }
        Ok(())
    })?;

    ctx.after_write(&[id.clone()]);
    issue_view(ctx, ctx.store.get_issue(&id)?)
}

fn op_update(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;

    let mut updates = IssueUpdates::default();
    if let Some(title) = str_field(payload, "title") {
        updates.title = Some(title.to_string());
    }
    if let Some(description) = payload.get("description").and_then(Value::as_str) {
        updates.description = Some(description.to_string());
    }
    if let Some(status) = str_field(payload, "status") {
        updates.status = Some(Status::from(status));
    }
    if let Some(priority) = payload.get("priority").and_then(Value::as_i64) {
        updates.priority = Some(priority as i32);
    }
    if let Some(type_str) = str_field(payload, "type") {
        updates.issue_type = Some(IssueType::from(type_str).normalize());
    }
    if let Some(assignee) = payload.get("assignee").and_then(Value::as_str) {
        updates.assignee = Some(assignee.to_string());
    }
    if let Some(metadata) = payload.get("metadata").filter(|m| !m.is_null()) {
        updates.metadata = Some(Some(metadata.to_string()));
    }
    if let Some(expected) = str_field(payload, "expected_updated_at") {
        let parsed = expected
            .parse::<chrono::DateTime<Utc>>()
            .map_err(|e| OpError::Invalid(format!("bad expected_updated_at: {e}")))?;
        updates.expected_updated_at = Some(parsed);
    }

    let issue = ctx.store.update_issue(id, &updates, &actor)?;
    ctx.after_write(&[id.to_string()]);
    issue_view(ctx, issue)
}

fn op_close(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let reason = str_field(payload, "reason").unwrap_or("closed");
    let session = str_field(payload, "session").unwrap_or("");
    let force = payload.get("force").and_then(Value::as_bool).unwrap_or(false);

    // Close-safety: a close that leaves unresolved blocking edges needs
    // force.
    let dependents = ctx.store.open_blocking_dependents(id)?;
    if !dependents.is_empty() && !force {
        return Err(OpError::Policy(format!(
            "{id} still blocks open work ({}); pass force to close anyway",
            dependents.join(", ")
        )));
    }

    ctx.store.close_issue(id, reason, &actor, session)?;
    ctx.after_write(&[id.to_string()]);
    Ok(json!({"id": id, "status": "closed", "reason": reason}))
}

fn op_reopen(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    ctx.store.reopen_issue(id, &actor)?;
    ctx.after_write(&[id.to_string()]);
    Ok(json!({"id": id, "status": "open"}))
}

fn op_tombstone(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    ctx.store.tombstone_issue(id, &actor)?;
    ctx.after_write(&[]);
    Ok(json!({"id": id, "status": "tombstone"}))
}

fn op_show(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let id = require_str(payload, "id")?;
    let issue = match ctx.load_issue_with_relations(id)? {
        Some(issue) => issue,
        None => return Err(OpError::Storage(StorageError::not_found("issue", id))),
    };
    let events = ctx.store.get_events(id, 20)?;
    let mut view = issue_view(ctx, issue)?;
    if let Some(map) = view.as_object_mut() {
        map.insert(
            "events".into(),
            serde_json::to_value(&events).unwrap_or(Value::Null),
        );
    }
    Ok(view)
}

fn op_list(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let mut filter = IssueFilter::default();
    if let Some(status) = str_field(payload, "status") {
        filter.status = Some(Status::from(status));
        filter.include_closed = true;
    }
    if payload.get("all").and_then(Value::as_bool).unwrap_or(false) {
        filter.include_closed = true;
    }
    if let Some(type_str) = str_field(payload, "type") {
        filter.issue_type = Some(IssueType::from(type_str));
    }
    if let Some(priority) = payload.get("priority").and_then(Value::as_i64) {
        filter.priority = Some(priority as i32);
    }
    if let Some(assignee) = str_field(payload, "assignee") {
        filter.assignee = Some(assignee.to_string());
    }
    if let Some(text) = str_field(payload, "text") {
        filter.text = Some(text.to_string());
    }
    filter.labels = str_list(payload, "labels");
    filter.labels_any = str_list(payload, "labels_any");
    if let Some(after_id) = str_field(payload, "after_id") {
        filter.after_id = Some(after_id.to_string());
    }
    if let Some(limit) = payload.get("limit").and_then(Value::as_i64) {
        filter.limit = Some(limit as i32);
    }

    issue_views(ctx, ctx.store.list_issues(&filter)?)
}

fn op_ready(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let mut filter = WorkFilter::default();
    if let Some(limit) = payload.get("limit").and_then(Value::as_i64) {
        filter.limit = Some(limit as i32);
    }
    if let Some(assignee) = str_field(payload, "assignee") {
        filter.assignee = Some(assignee.to_string());
    }
    if let Some(type_str) = str_field(payload, "type") {
        filter.issue_type = Some(IssueType::from(type_str));
    }
    if let Some(epic_id) = str_field(payload, "epic") {
        filter.epic_id = Some(epic_id.to_string());
    }
    filter.labels = str_list(payload, "labels");
    filter.labels_any = str_list(payload, "labels_any");

    issue_views(ctx, ctx.store.get_ready_work(&filter)?)
}

fn op_blocked(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let mut filter = WorkFilter::default();
    if let Some(limit) = payload.get("limit").and_then(Value::as_i64) {
        filter.limit = Some(limit as i32);
    }
    let blocked = ctx.store.get_blocked_issues(&filter)?;
    let views: Vec<Value> = blocked
        .into_iter()
        .map(|b| {
            json!({
                "issue": serde_json::to_value(&b.issue).unwrap_or(Value::Null),
                "blockers": b.blockers,
            })
        })
        .collect();
    Ok(Value::Array(views))
}

fn op_epic_rollup(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let id = require_str(payload, "id")?;
    let rollup = ctx.store.get_epic_rollup(id)?;
    Ok(json!({
        "epic": serde_json::to_value(&rollup.epic).unwrap_or(Value::Null),
        "total_children": rollup.total_children,
        "closed_children": rollup.closed_children,
        "ready": rollup.ready.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
    }))
}

// ---------------------------------------------------------------------------
// Dependencies and labels
// ---------------------------------------------------------------------------

fn op_dep_add(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let from = require_str(payload, "from")?;
    let to = require_str(payload, "to")?;
    let dep_type = str_field(payload, "type")
        .map(DependencyType::from)
        .unwrap_or_default();

    ctx.store
        .add_dependency(&Dependency::new(from, to, dep_type.clone(), &actor), &actor)?;
    ctx.after_write(&[from.to_string()]);
    Ok(json!({"from": from, "to": to, "type": dep_type.as_str()}))
}

fn op_dep_remove(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let from = require_str(payload, "from")?;
    let to = require_str(payload, "to")?;
    ctx.store.remove_dependency(from, to, &actor)?;
    ctx.after_write(&[from.to_string()]);
    Ok(json!({"from": from, "to": to, "removed": true}))
}

fn op_label_add(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let label = require_str(payload, "label")?;
    ctx.store.add_label(id, label, &actor)?;
    ctx.after_write(&[id.to_string()]);
    Ok(json!({"id": id, "labels": ctx.store.get_labels(id)?}))
}

fn op_label_remove(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let label = require_str(payload, "label")?;
    ctx.store.remove_label(id, label, &actor)?;
    ctx.after_write(&[id.to_string()]);
    Ok(json!({"id": id, "labels": ctx.store.get_labels(id)?}))
}

fn op_label_list(ctx: &DaemonContext) -> OpResult {
    let counts = ctx.store.label_counts()?;
    let views: Vec<Value> = counts
        .into_iter()
        .map(|(label, count)| json!({"label": label, "count": count}))
        .collect();
    Ok(Value::Array(views))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

fn op_comment_add(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let text = require_str(payload, "text")?;
    let comment = ctx.store.add_comment(id, &actor, text)?;
    ctx.after_write(&[id.to_string()]);
    serde_json::to_value(&comment).map_err(|e| OpError::Invalid(e.to_string()))
}

fn op_comment_list(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let id = require_str(payload, "id")?;
    let comments = ctx.store.get_comments(id)?;
    serde_json::to_value(&comments).map_err(|e| OpError::Invalid(e.to_string()))
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

fn op_inbox_push(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let content = require_str(payload, "content")?;
    let dedup_key = require_str(payload, "dedup_key")?;

    // Default scope: every agent in the workspace.
    let recipients: Vec<String> = match str_field(payload, "to") {
        Some(to) => vec![to.to_string()],
        None => {
            let agents = ctx.store.list_issues(&IssueFilter {
                issue_type: Some(IssueType::Agent),
                ..Default::default()
            })?;
            agents.into_iter().map(|a| a.title).collect()
        }
    };
    if recipients.is_empty() {
        return Err(OpError::Invalid(
            "no recipient given and no agents registered".into(),
        ));
    }
    let broadcast = recipients.len() > 1;

    let mut inserted = 0usize;
    for recipient in &recipients {
        let key = if broadcast {
            format!("{dedup_key}:{recipient}")
        } else {
            dedup_key.to_string()
        };
        let mut msg = InboxMessage::new(recipient.clone(), content, key);
        if let Some(msg_type) = str_field(payload, "type") {
            msg.msg_type = msg_type.to_string();
        }
        if let Some(source) = str_field(payload, "source") {
            msg.source = source.to_string();
        }
        if let Some(rig) = str_field(payload, "rig") {
            msg.rig = rig.to_string();
        }
        if let Some(priority) = payload.get("priority").and_then(Value::as_i64) {
            msg.priority = priority as i32;
        }
        if let Some(expires_in) = payload.get("expires_in_secs").and_then(Value::as_i64) {
            msg.expires_at = Some(Utc::now() + chrono::Duration::seconds(expires_in));
        }

        // Tier 1: authoritative row first, then the stream nudge.
        if ctx.store.inbox_push(&msg)? {
            inserted += 1;
            // Federated inbox file; dedup on import falls out of dedup_key.
            if let Err(e) =
                beads_federation::export::export_record(&ctx.federation.inbox(), &msg)
            {
                warn!(%recipient, error = %e, "inbox federation export failed");
            }
        }
        let note = serde_json::to_value(&msg).unwrap_or(Value::Null);
        if let Err(e) = ctx.stream.publish(&agent_subject(recipient), &note) {
            warn!(%recipient, error = %e, "inbox stream publish failed");
        }
        if let Err(e) = ctx.stream.publish(beads_bus::stream::ALL_SUBJECT, &note) {
            warn!(error = %e, "inbox broadcast publish failed");
        }
    }

    Ok(json!({"recipients": recipients, "inserted": inserted}))
}

fn op_inbox_list(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let agent = require_str(payload, "agent")?;
    let limit = payload
        .get("limit")
        .and_then(Value::as_i64)
        .unwrap_or(50) as i32;
    let messages = ctx.store.inbox_list(agent, limit)?;
    serde_json::to_value(&messages).map_err(|e| OpError::Invalid(e.to_string()))
}

fn op_inbox_drain(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let agent = require_str(payload, "agent")?;
    let session = require_str(payload, "session")?;
    let session_start = payload
        .get("session_start")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let buffer = MergeBuffer::new(ctx.runtime.inject_queue(session));
    let blocks = drain_session(
        ctx.store.as_ref(),
        &buffer,
        agent,
        session_start,
        Utc::now(),
    )?;
    Ok(json!({"blocks": blocks}))
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

fn op_decision_create(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let title = require_str(payload, "title")?;
    let prompt = str_field(payload, "prompt").unwrap_or(title);
    let requested_by = str_field(payload, "requested_by").unwrap_or(&actor);
    let default = str_field(payload, "default").unwrap_or("");

    let options: Vec<DecisionOption> = payload
        .get("options")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| OpError::Invalid(format!("bad options: {e}")))?
        .unwrap_or_default();

    let id = match str_field(payload, "id") {
        Some(id) => id.to_string(),
        None => ctx.generate_issue_id(title, prompt, &actor)?,
    };

    let issue = decision::create_decision(
        ctx.store.as_ref(),
        &id,
        title,
        prompt,
        options,
        default,
        requested_by,
        &actor,
    )?;
    ctx.after_write(&[id.clone()]);

    // DecisionCreated rides both halves of the bus.
    let event = HookEvent::new(HookEventType::DecisionCreated, "")
        .with_agent(requested_by)
        .with_payload(json!({"decision_id": id}));
    let outcome = ctx.bus.lock().unwrap().dispatch(&event);
    if let Err(e) = ctx.stream.publish(
        DECISIONS_SUBJECT,
        &serde_json::to_value(&event).unwrap_or(Value::Null),
    ) {
        warn!(error = %e, "decision stream publish failed");
    }
    let _ = outcome;

    issue_view(ctx, issue)
}

fn op_decision_respond(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let selected = str_field(payload, "selected").unwrap_or("");
    let text = str_field(payload, "text").unwrap_or("");

    // Steps 1 (database resolve) and 2 (inbox push) happen inside respond;
    // the hook fires strictly after.
    let response = decision::respond(ctx.store.as_ref(), id, selected, text, &actor)?;
    ctx.after_write(&[id.to_string()]);

    let event = HookEvent::new(HookEventType::DecisionResponded, "")
        .with_agent(&response.requested_by)
        .with_payload(json!({
            "decision_id": id,
            "selected": response.selected,
            "text": response.text,
        }));
    let outcome = ctx.bus.lock().unwrap().dispatch(&event);
    if let Err(e) = ctx.stream.publish(
        DECISIONS_SUBJECT,
        &serde_json::to_value(&event).unwrap_or(Value::Null),
    ) {
        warn!(error = %e, "decision stream publish failed");
    }

    Ok(json!({
        "id": id,
        "selected": response.selected,
        "text": response.text,
        "requested_by": response.requested_by,
        "warnings": outcome.result.warnings,
    }))
}

fn op_decision_list(ctx: &DaemonContext) -> OpResult {
    let pending = decision::list_pending(ctx.store.as_ref())?;
    issue_views(ctx, pending)
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

fn op_gate_register(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let scope = str_field(payload, "scope").unwrap_or("db");
    match scope {
        "session" => {
            let session = require_str(payload, "session")?;
            let gate_id = require_str(payload, "gate_id")?;
            let gates = SessionGates::new(ctx.runtime.gates_dir(session));
            gates
                .register(SessionGate {
                    id: gate_id.to_string(),
                    description: str_field(payload, "description").unwrap_or("").to_string(),
                    strict: payload.get("strict").and_then(Value::as_bool).unwrap_or(false),
                })
                .map_err(OpError::from)?;
            Ok(json!({"scope": "session", "gate_id": gate_id}))
        }
        _ => {
            let actor = actor_of(payload);
            let title = require_str(payload, "title")?;
            let meta = GateMeta {
                await_type: str_field(payload, "await_type")
                    .map(beads_core::enums::AwaitType::from)
                    .unwrap_or_default(),
                await_id: str_field(payload, "await_id").unwrap_or("").to_string(),
                timeout_secs: payload
                    .get("timeout_secs")
                    .and_then(Value::as_u64),
                waiters: str_list(payload, "waiters"),
            };
            let id = match str_field(payload, "id") {
                Some(id) => id.to_string(),
                None => ctx.generate_issue_id(title, "", &actor)?,
            };
            let mut issue = IssueBuilder::new(title)
                .id(id.as_str())
                .issue_type(IssueType::Gate)
                .created_by(actor.as_str())
                .build();
            issue
                .set_metadata(&meta)
                .map_err(|e| OpError::Invalid(e.to_string()))?;
            beads_core::validation::validate(&issue)
                .map_err(|e| OpError::Invalid(e.to_string()))?;
            ctx.store.create_issue(&issue, &actor)?;
            ctx.after_write(&[id.clone()]);
            issue_view(ctx, ctx.store.get_issue(&id)?)
        }
    }
}

fn op_gate_resolve(ctx: &DaemonContext, payload: &Value) -> OpResult {
    if let Some(session) = str_field(payload, "session") {
        let gate_id = require_str(payload, "gate_id")?;
        let gates = SessionGates::new(ctx.runtime.gates_dir(session));
        gates.resolve(gate_id).map_err(OpError::from)?;
        return Ok(json!({"scope": "session", "gate_id": gate_id, "resolved": true}));
    }

    let actor = actor_of(payload);
    let id = require_str(payload, "id")?;
    let reason = str_field(payload, "reason").unwrap_or("resolved by operator");

    let gate = ctx.store.get_issue(id)?;
    if gate.issue_type != IssueType::Gate {
        return Err(OpError::Invalid(format!("{id} is not a gate")));
    }
    ctx.store.close_issue(id, reason, &actor, "")?;
    let meta = GateMeta::from_issue(&gate).unwrap_or_default();
    for waiter in &meta.waiters {
        let mut msg = InboxMessage::new(
            waiter.clone(),
            format!("gate {id} resolved: {reason}"),
            format!("gate:{id}"),
        );
        msg.msg_type = "gate".into();
        msg.source = id.to_string();
        msg.priority = 1;
        ctx.store.inbox_push(&msg)?;
    }
    ctx.after_write(&[id.to_string()]);
    Ok(json!({"id": id, "resolved": true, "notified": meta.waiters}))
}

fn op_gate_check(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let probe = HttpGithubProbe::new(std::env::var("GITHUB_TOKEN").ok());
    let resolved = gates::check_db_gates(ctx.store.as_ref(), &probe, Utc::now(), "daemon")?;
    for id in &resolved {
        ctx.after_write(&[id.clone()]);
    }

    let session_unresolved = match str_field(payload, "session") {
        Some(session) => {
            let gates = SessionGates::new(ctx.runtime.gates_dir(session));
            gates
                .unresolved()
                .map_err(OpError::from)?
                .into_iter()
                .map(|g| json!({"id": g.id, "strict": g.strict, "description": g.description}))
                .collect()
        }
        None => Vec::new(),
    };

    let open: Vec<String> = ctx
        .store
        .open_gates()?
        .into_iter()
        .filter(|g| g.issue_type == IssueType::Gate)
        .map(|g| g.id)
        .collect();

    Ok(json!({
        "resolved": resolved,
        "open": open,
        "session_unresolved": session_unresolved,
    }))
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// TOML shape of a formula definition.
#[derive(serde::Deserialize)]
struct FormulaDoc {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<beads_core::metadata::FormulaStep>,
}

fn op_formula_import(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let actor = actor_of(payload);
    let text = require_str(payload, "toml")?;
    let doc: FormulaDoc =
        toml::from_str(text).map_err(|e| OpError::Invalid(format!("bad formula TOML: {e}")))?;
    if doc.steps.is_empty() {
        return Err(OpError::Invalid("formula has no steps".into()));
    }

    let meta = FormulaMeta {
        formula_name: doc.name.clone(),
        steps: doc.steps,
    };
    let id = ctx.generate_issue_id(&doc.name, &doc.description, &actor)?;
    let mut issue = IssueBuilder::new(doc.name.as_str())
        .id(id.as_str())
        .description(doc.description.as_str())
        .issue_type(IssueType::Formula)
        .is_template(true)
        .source_formula(doc.name.as_str())
        .created_by(actor.as_str())
        .build();
    issue
        .set_metadata(&meta)
        .map_err(|e| OpError::Invalid(e.to_string()))?;

    ctx.store.create_issue(&issue, &actor)?;
    ctx.after_write(&[id.clone()]);
    issue_view(ctx, ctx.store.get_issue(&id)?)
}

fn op_formula_list(ctx: &DaemonContext) -> OpResult {
    let formulas = ctx.store.list_issues(&IssueFilter {
        issue_type: Some(IssueType::Formula),
        include_templates: true,
        ..Default::default()
    })?;
    issue_views(ctx, formulas)
}

fn op_formula_show(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let name = require_str(payload, "name")?;
    let formulas = ctx.store.list_issues(&IssueFilter {
        issue_type: Some(IssueType::Formula),
        include_templates: true,
        ..Default::default()
    })?;
    let found = formulas
        .into_iter()
        .find(|f| f.id == name || f.source_formula == name || f.title == name)
        .ok_or_else(|| OpError::Storage(StorageError::not_found("formula", name)))?;
    issue_view(ctx, found)
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

fn op_bus_emit(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let event: HookEvent = serde_json::from_value(
        payload.get("event").cloned().unwrap_or(Value::Null),
    )
    .map_err(|e| OpError::Invalid(format!("bad event: {e}")))?;

    let outcome = ctx.bus.lock().unwrap().dispatch(&event);
    if let Err(e) = ctx.stream.publish(
        HOOKS_SUBJECT,
        &serde_json::to_value(&event).unwrap_or(Value::Null),
    ) {
        warn!(error = %e, "hook stream publish failed");
    }

    Ok(json!({
        "result": serde_json::to_value(&outcome.result).unwrap_or(Value::Null),
        "handler_errors": outcome
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>(),
    }))
}

fn op_bus_register(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let row = BusHandlerRow {
        id: require_str(payload, "id")?.to_string(),
        event_types: require_str(payload, "event_types")?.to_string(),
        command: require_str(payload, "command")?.to_string(),
        priority: payload.get("priority").and_then(Value::as_i64).unwrap_or(100) as i32,
        enabled: payload.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        timeout_s: payload.get("timeout_s").and_then(Value::as_i64).unwrap_or(10),
    };
    ctx.store.register_bus_handler(&row)?;
    reload_external_handlers(&mut ctx.bus.lock().unwrap(), &ctx.store.list_bus_handlers()?);
    Ok(json!({"id": row.id, "registered": true}))
}

fn op_bus_unregister(ctx: &DaemonContext, payload: &Value) -> OpResult {
    let id = require_str(payload, "id")?;
    ctx.store.unregister_bus_handler(id)?;
    reload_external_handlers(&mut ctx.bus.lock().unwrap(), &ctx.store.list_bus_handlers()?);
    Ok(json!({"id": id, "unregistered": true}))
}

fn op_bus_handlers(ctx: &DaemonContext) -> OpResult {
    let rows = ctx.store.list_bus_handlers()?;
    serde_json::to_value(&rows).map_err(|e| OpError::Invalid(e.to_string()))
}

// ---------------------------------------------------------------------------
// Daemon status / sync / doctor
// ---------------------------------------------------------------------------

fn op_daemon_status(ctx: &DaemonContext) -> OpResult {
    let stats = ctx.store.get_statistics()?;
    Ok(json!({
        "pid": std::process::id(),
        "protocol_version": PROTOCOL_VERSION,
        "backend": format!("{:?}", ctx.metadata.backend).to_lowercase(),
        "workspace": ctx.workspace_root.display().to_string(),
        "issues": stats.total_issues,
        "open": stats.open_issues,
    }))
}

fn op_sync(ctx: &DaemonContext, _payload: &Value) -> OpResult {
    let mut warnings: Vec<String> = Vec::new();

    // Export everything the file is missing.
    let exported = ctx.export_all()?;

    // Commit, pull (merge driver resolves), re-import, push.
    let committed = match beads_git::sync::commit_federation_files(
        &ctx.workspace_root,
        &format!("{} sync", ctx.config.sync.commit_prefix),
    ) {
        Ok(committed) => committed,
        Err(e) => {
            warnings.push(format!("commit skipped: {e}"));
            false
        }
    };
    if let Err(e) = beads_git::sync::pull(&ctx.workspace_root) {
        warnings.push(format!("pull skipped: {e}"));
    }

    let stats = beads_federation::import::import_issues(ctx.store.as_ref(), &ctx.federation)
        .map_err(|e| OpError::External(e.to_string()))?;

    if let Err(e) = beads_git::sync::push(&ctx.workspace_root) {
        warnings.push(format!("push skipped: {e}"));
    }

    Ok(json!({
        "exported": exported,
        "committed": committed,
        "imported_created": stats.created,
        "imported_updated": stats.updated,
        "import_skipped": stats.skipped,
        "warnings": warnings,
    }))
}

fn op_doctor(ctx: &DaemonContext) -> OpResult {
    let stats = ctx.store.get_statistics()?;
    let live = (stats.total_issues - stats.tombstoned_issues).max(0) as usize;

    let drift = beads_federation::drift::check_drift(live, &ctx.federation.issues())
        .map_err(|e| OpError::External(e.to_string()))?;

    // Rebuild derived caches and report how far they had drifted.
    let cache_drift = ctx.store.rebuild_caches()?;

    let mut findings: Vec<String> = Vec::new();
    if drift.is_suspect() {
        findings.push(format!(
            "federation drift: {} issues in db, {} ids in file",
            drift.db_issues, drift.file_ids
        ));
    }
    if cache_drift > 0 {
        findings.push(format!(
            "blocked cache drifted on {cache_drift} rows (rebuilt)"
        ));
    }

    // Revalidate the acyclicity invariant from a fresh snapshot and audit
    // epic intake.
    let issues = ctx.store.list_issues(&IssueFilter {
        include_closed: true,
        include_templates: true,
        ..Default::default()
    })?;
    let mut deps = Vec::new();
    for issue in &issues {
        deps.extend(ctx.store.get_dependency_records(&issue.id)?);
    }
    let epics: Vec<String> = issues
        .iter()
        .filter(|i| i.issue_type == IssueType::Epic && i.status == Status::Open)
        .map(|i| i.id.clone())
        .collect();
    let snapshot = beads_graph::GraphSnapshot::new(issues, &deps);
    if let Err(e) = beads_graph::cycle::verify_acyclic(&snapshot) {
        findings.push(format!("dependency graph invariant violated: {e}"));
    }
    for epic_id in &epics {
        if let Ok(progress) = beads_graph::rollup::progress(&snapshot, epic_id) {
            if progress.total == 0 {
                findings.push(format!("epic {epic_id} has no children"));
            }
        }
    }

    Ok(json!({
        "issues": stats.total_issues,
        "open": stats.open_issues,
        "closed": stats.closed_issues,
        "tombstoned": stats.tombstoned_issues,
        "by_type": stats.by_type,
        "file_lines": drift.file_lines,
        "file_ids": drift.file_ids,
        "cache_drift": cache_drift,
        "findings": findings,
        "healthy": findings.is_empty(),
    }))
}
