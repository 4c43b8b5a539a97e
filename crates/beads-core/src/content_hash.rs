//! Deterministic content hashing for issues.
//!
//! Produces a SHA-256 hex digest over all substantive fields, excluding the
//! ID and timestamps, so that identical content hashes identically across
//! clones. Federation dedups lines by this digest; storage recomputes it on
//! every write so the invariant "hash changes iff content changes" holds.

use sha2::{Digest, Sha256};

use crate::issue::Issue;

/// Separator byte written between fields.
const SEP: u8 = 0;

/// Computes a deterministic content hash for an issue.
pub fn compute_content_hash(issue: &Issue) -> String {
    let mut h = Sha256::new();

    write_str(&mut h, &issue.title);
    write_str(&mut h, &issue.description);
    write_str(&mut h, issue.status.as_str());
    write_int(&mut h, issue.priority);
    write_str(&mut h, issue.issue_type.as_str());
    write_str(&mut h, &issue.assignee);
    write_str(&mut h, &issue.created_by);
    write_str(&mut h, &issue.close_reason);

    // Metadata blob participates verbatim; callers keep it canonical by
    // writing through `Issue::set_metadata`.
    match &issue.metadata {
        Some(meta) => write_str(&mut h, meta.get()),
        None => h.update([SEP]),
    }

    write_str(&mut h, &issue.source_repo);
    write_str(&mut h, &issue.source_formula);
    write_flag(&mut h, issue.is_template, "template");

    format!("{:x}", h.finalize())
}

// -- helper writers --------------------------------------------------------

fn write_str(h: &mut Sha256, s: &str) {
    h.update(s.as_bytes());
    h.update([SEP]);
}

fn write_int(h: &mut Sha256, n: i32) {
    h.update(n.to_string().as_bytes());
    h.update([SEP]);
}

fn write_flag(h: &mut Sha256, b: bool, label: &str) {
    if b {
        h.update(label.as_bytes());
    }
    h.update([SEP]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueBuilder;

    #[test]
    fn content_hash_deterministic() {
        let issue = IssueBuilder::new("Test issue")
            .description("A description")
            .priority(2)
            .build();

        let hash1 = compute_content_hash(&issue);
        let hash2 = compute_content_hash(&issue);
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 hex = 64 chars
    }

    #[test]
    fn content_hash_differs_on_change() {
        let issue1 = IssueBuilder::new("Title A").build();
        let issue2 = IssueBuilder::new("Title B").build();
        assert_ne!(compute_content_hash(&issue1), compute_content_hash(&issue2));
    }

    #[test]
    fn content_hash_ignores_id_and_timestamps() {
        let mut issue1 = IssueBuilder::new("Same content").build();
        let mut issue2 = IssueBuilder::new("Same content").build();

        issue1.id = "bd-aaa".into();
        issue2.id = "bd-bbb".into();
        issue1.created_at = chrono::Utc::now();
        issue2.created_at = chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        assert_eq!(compute_content_hash(&issue1), compute_content_hash(&issue2));
    }

    #[test]
    fn content_hash_covers_metadata() {
        let mut issue1 = IssueBuilder::new("Gate").build();
        let mut issue2 = IssueBuilder::new("Gate").build();
        issue1
            .set_metadata(&serde_json::json!({"await_type": "timer"}))
            .unwrap();
        issue2
            .set_metadata(&serde_json::json!({"await_type": "human"}))
            .unwrap();
        assert_ne!(compute_content_hash(&issue1), compute_content_hash(&issue2));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // "ab" + "c" must not hash like "a" + "bc".
        let issue1 = IssueBuilder::new("ab").description("c").build();
        let issue2 = IssueBuilder::new("a").description("bc").build();
        assert_ne!(compute_content_hash(&issue1), compute_content_hash(&issue2));
    }
}
