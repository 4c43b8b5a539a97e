//! JSONL (JSON Lines) read/write support.
//!
//! Federation files are line-delimited JSON in canonical form: one object per
//! line, keys in lexicographic order, trailing newline. Canonicalisation goes
//! through `serde_json::Value`, whose map type keeps keys sorted.

use std::io::{self, BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// Renders a record as one canonical JSON line (sorted keys, no newline).
pub fn canonical_line<T: Serialize>(record: &T) -> Result<String> {
    let value = serde_json::to_value(record).map_err(|e| JsonlError::Json { line: 0, source: e })?;
    serde_json::to_string(&value).map_err(|e| JsonlError::Json { line: 0, source: e })
}

/// SHA-256 hex digest of a canonical line; the federation dedup key for
/// records that carry no content hash of their own.
pub fn line_hash(line: &str) -> String {
    format!("{:x}", Sha256::digest(line.as_bytes()))
}

/// Writes records as canonical JSONL to the given writer.
pub fn write_jsonl<W: Write, T: Serialize>(writer: &mut W, records: &[T]) -> Result<()> {
    for record in records {
        let line = canonical_line(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns an iterator that reads records from a JSONL reader.
///
/// Each line is parsed as a JSON object. Empty lines are skipped.
pub fn read_jsonl<R: BufRead, T: DeserializeOwned>(reader: R) -> JsonlIter<R, T> {
    JsonlIter {
        reader,
        line_number: 0,
        _marker: std::marker::PhantomData,
    }
}

/// Iterator over JSONL-encoded records.
pub struct JsonlIter<R, T> {
    reader: R,
    line_number: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonlIter<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<T>(trimmed) {
                        Ok(record) => return Some(Ok(record)),
                        Err(e) => {
                            return Some(Err(JsonlError::Json {
                                line: self.line_number,
                                source: e,
                            }));
                        }
                    }
                }
                Err(e) => return Some(Err(JsonlError::Io(e))),
            }
        }
    }
}
