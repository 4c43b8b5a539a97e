//! Durable per-subject streams with per-consumer offsets.
//!
//! Each subject is an append-only JSONL segment under `stream/`; consumers
//! are durable (named) with a `deliver-new` policy: on first attach they
//! start at the current end of the subject. Fetch returns entries after the
//! committed offset; an entry stays uncommitted until acked, so a consumer
//! restart redelivers it (at-least-once).
//!
//! Publishing is best-effort: callers treat failures as warnings, never as
//! request failures.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{BusError, Result};

/// Subject for one agent's inbox notifications.
pub fn agent_subject(agent_name: &str) -> String {
    format!("inbox.agent.{agent_name}")
}

/// Subject for one rig's inbox notifications.
pub fn rig_subject(rig: &str) -> String {
    format!("inbox.rig.{rig}")
}

/// Broadcast subject: every agent in the workspace.
pub const ALL_SUBJECT: &str = "inbox.all";

/// Subject carrying hook events.
pub const HOOKS_SUBJECT: &str = "hooks";

/// Subject carrying decision lifecycle events.
pub const DECISIONS_SUBJECT: &str = "decisions";

/// One delivered stream entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    /// 1-based sequence number within the subject.
    pub seq: u64,
    pub value: serde_json::Value,
}

/// A file-backed stream root.
#[derive(Debug, Clone)]
pub struct Stream {
    root: PathBuf,
}

impl Stream {
    /// Opens (creating) a stream root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("offsets"))?;
        Ok(Self { root })
    }

    fn subject_path(&self, subject: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", sanitize(subject)))
    }

    fn offset_path(&self, consumer: &str, subject: &str) -> PathBuf {
        self.root
            .join("offsets")
            .join(format!("{}__{}.json", sanitize(consumer), sanitize(subject)))
    }

    /// Appends one entry to a subject. Exclusive advisory lock keeps
    /// concurrent publishers from tearing lines.
    pub fn publish(&self, subject: &str, value: &serde_json::Value) -> Result<u64> {
        let path = self.subject_path(subject);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(value)?;
        let result = (&file).write_all(format!("{line}\n").as_bytes());
        let _ = fs2::FileExt::unlock(&file);
        result?;
        Ok(self.end_of(subject)?)
    }

    /// The sequence number of the last entry in a subject (0 when empty).
    pub fn end_of(&self, subject: &str) -> Result<u64> {
        Ok(read_lines(&self.subject_path(subject))?.len() as u64)
    }

    /// Attaches a durable consumer to a subject.
    pub fn consumer(&self, name: &str, subject: &str) -> Result<Consumer> {
        let offset_path = self.offset_path(name, subject);
        let state = if offset_path.is_file() {
            let text = std::fs::read_to_string(&offset_path)?;
            serde_json::from_str(&text).unwrap_or_default()
        } else {
            // deliver-new: start at the current end of the subject.
            let state = OffsetState {
                committed: self.end_of(subject)?,
            };
            write_offset(&offset_path, &state)?;
            state
        };
        Ok(Consumer {
            subject_path: self.subject_path(subject),
            offset_path,
            committed: state.committed,
        })
    }
}

/// A durable consumer over one subject.
pub struct Consumer {
    subject_path: PathBuf,
    offset_path: PathBuf,
    committed: u64,
}

impl Consumer {
    /// The committed offset (last acked sequence number).
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Returns up to `max` entries after the committed offset. Entries not
    /// yet acked are returned again by the next fetch (at-least-once).
    pub fn fetch(&self, max: usize) -> Result<Vec<StreamEntry>> {
        let lines = read_lines(&self.subject_path)?;
        let mut entries = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let seq = (idx + 1) as u64;
            if seq <= self.committed {
                continue;
            }
            if entries.len() >= max {
                break;
            }
            match serde_json::from_str(line) {
                Ok(value) => entries.push(StreamEntry { seq, value }),
                Err(e) => {
                    return Err(BusError::Json(e));
                }
            }
        }
        Ok(entries)
    }

    /// Acknowledges all entries up to and including `seq`, persisting the
    /// offset.
    pub fn ack(&mut self, seq: u64) -> Result<()> {
        if seq <= self.committed {
            return Ok(());
        }
        self.committed = seq;
        write_offset(&self.offset_path, &OffsetState { committed: seq })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OffsetState {
    committed: u64,
}

fn write_offset(path: &Path, state: &OffsetState) -> Result<()> {
    let text = serde_json::to_string(state)?;
    std::fs::write(path, text)?;
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(BusError::Io(e)),
    }
}

/// Subjects become file names; path separators and dots are flattened.
fn sanitize(subject: &str) -> String {
    subject
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream() -> (tempfile::TempDir, Stream) {
        let dir = tempfile::tempdir().unwrap();
        let stream = Stream::open(dir.path().join("stream")).unwrap();
        (dir, stream)
    }

    #[test]
    fn publish_and_fetch() {
        let (_dir, stream) = test_stream();
        let subject = agent_subject("mayor");

        let mut consumer = stream.consumer("mayor-consumer", &subject).unwrap();
        stream
            .publish(&subject, &serde_json::json!({"content": "hello"}))
            .unwrap();

        let entries = consumer.fetch(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[0].value["content"], "hello");

        consumer.ack(1).unwrap();
        assert!(consumer.fetch(10).unwrap().is_empty());
    }

    #[test]
    fn deliver_new_skips_history() {
        let (_dir, stream) = test_stream();
        let subject = agent_subject("mayor");
        stream
            .publish(&subject, &serde_json::json!({"old": true}))
            .unwrap();

        // Consumer attaches after the first entry: it never sees it.
        let mut consumer = stream.consumer("late", &subject).unwrap();
        assert!(consumer.fetch(10).unwrap().is_empty());

        stream
            .publish(&subject, &serde_json::json!({"new": true}))
            .unwrap();
        let entries = consumer.fetch(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value["new"], true);
        consumer.ack(entries[0].seq).unwrap();
    }

    #[test]
    fn unacked_entries_redeliver_after_restart() {
        let (_dir, stream) = test_stream();
        let subject = agent_subject("mayor");
        let consumer = stream.consumer("worker", &subject).unwrap();
        stream
            .publish(&subject, &serde_json::json!({"n": 1}))
            .unwrap();

        // Fetched but never acked.
        assert_eq!(consumer.fetch(10).unwrap().len(), 1);
        drop(consumer);

        // Reattach: the entry comes back.
        let mut consumer = stream.consumer("worker", &subject).unwrap();
        let entries = consumer.fetch(10).unwrap();
        assert_eq!(entries.len(), 1);
        consumer.ack(entries[0].seq).unwrap();
        drop(consumer);

        // Acked offsets survive restarts.
        let consumer = stream.consumer("worker", &subject).unwrap();
        assert!(consumer.fetch(10).unwrap().is_empty());
    }

    #[test]
    fn consumers_are_independent() {
        let (_dir, stream) = test_stream();
        let subject = ALL_SUBJECT;
        let mut a = stream.consumer("agent-a", subject).unwrap();
        let mut b = stream.consumer("agent-b", subject).unwrap();
        stream
            .publish(subject, &serde_json::json!({"broadcast": true}))
            .unwrap();

        let entries_a = a.fetch(10).unwrap();
        assert_eq!(entries_a.len(), 1);
        a.ack(entries_a[0].seq).unwrap();

        // b still has its own copy pending.
        let entries_b = b.fetch(10).unwrap();
        assert_eq!(entries_b.len(), 1);
        b.ack(entries_b[0].seq).unwrap();
    }

    #[test]
    fn fetch_respects_max() {
        let (_dir, stream) = test_stream();
        let subject = rig_subject("alpha");
        let consumer = stream.consumer("c", &subject).unwrap();
        for n in 0..5 {
            stream.publish(&subject, &serde_json::json!({"n": n})).unwrap();
        }
        assert_eq!(consumer.fetch(2).unwrap().len(), 2);
    }

    #[test]
    fn subject_names_flatten_to_files() {
        assert_eq!(sanitize("inbox.agent.mayor"), "inbox.agent.mayor");
        assert_eq!(sanitize("a/b:c"), "a_b_c");
    }
}
