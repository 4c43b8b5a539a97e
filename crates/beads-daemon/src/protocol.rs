//! Wire protocol: length-prefixed JSON over a local socket.
//!
//! Each message is a 4-byte big-endian length followed by that many bytes
//! of JSON. One request per message, one synchronous response per request;
//! pipelining is allowed because responses preserve order.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::{DaemonError, Result};

/// Current protocol version. The daemon rejects clients older than the
/// configured floor.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame; anything larger is a protocol error.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// An RPC request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Operation name, e.g. `create`, `dep.add`, `inbox.drain`.
    pub op: String,

    /// Client protocol version.
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Operation arguments.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Per-request deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Request {
    pub fn new(op: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            op: op.into(),
            version: PROTOCOL_VERSION,
            auth_token: None,
            payload,
            deadline_ms: None,
        }
    }
}

/// Error detail carried on failed responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    /// Stable error kind (`not_found`, `cycle`, `policy_violation`, ...).
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl RpcErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Maps an error kind to the process exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self.kind.as_str() {
            "invalid" => 2,
            "policy_violation" => 3,
            "unavailable" => 4,
            "integrity" => 5,
            _ => 1,
        }
    }
}

impl From<&beads_storage::StorageError> for RpcErrorInfo {
    fn from(e: &beads_storage::StorageError) -> Self {
        let mut info = Self::new(e.kind(), e.to_string());
        if matches!(e, beads_storage::StorageError::Integrity(_)) {
            info.hint = Some("run 'bd doctor' to rebuild derived state".into());
        }
        info
    }
}

/// An RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorInfo>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Response {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            ok: true,
            error: None,
            payload,
        }
    }

    pub fn failure(error: RpcErrorInfo) -> Self {
        Self {
            ok: false,
            error: Some(error),
            payload: serde_json::Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Writes one length-prefixed JSON message.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    let len = body.len() as u32;
    if len > MAX_FRAME_BYTES {
        return Err(DaemonError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed JSON message. `Ok(None)` on a clean EOF at a
/// frame boundary.
pub fn read_frame<R: Read, T: serde::de::DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(DaemonError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(Some(serde_json::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let request = Request::new("create", serde_json::json!({"title": "x"}));
        let mut buf = Vec::new();
        write_frame(&mut buf, &request).unwrap();

        // 4-byte big-endian prefix.
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len() - 4);

        let mut cursor = std::io::Cursor::new(buf);
        let back: Request = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(back.op, "create");
        assert_eq!(back.version, PROTOCOL_VERSION);
        assert_eq!(back.payload["title"], "x");
    }

    #[test]
    fn clean_eof_reads_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let frame: Option<Request> = read_frame(&mut cursor).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn pipelined_frames_preserve_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::new("first", serde_json::Value::Null)).unwrap();
        write_frame(&mut buf, &Request::new("second", serde_json::Value::Null)).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let a: Request = read_frame(&mut cursor).unwrap().unwrap();
        let b: Request = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(a.op, "first");
        assert_eq!(b.op, "second");
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Option<Request>> = read_frame(&mut cursor);
        assert!(matches!(result, Err(DaemonError::FrameTooLarge(_))));
    }

    #[test]
    fn exit_codes_by_kind() {
        assert_eq!(RpcErrorInfo::new("invalid", "").exit_code(), 2);
        assert_eq!(RpcErrorInfo::new("policy_violation", "").exit_code(), 3);
        assert_eq!(RpcErrorInfo::new("unavailable", "").exit_code(), 4);
        assert_eq!(RpcErrorInfo::new("integrity", "").exit_code(), 5);
        assert_eq!(RpcErrorInfo::new("not_found", "").exit_code(), 1);
    }

    #[test]
    fn storage_error_maps_with_hint() {
        let e = beads_storage::StorageError::Integrity("cache drift".into());
        let info = RpcErrorInfo::from(&e);
        assert_eq!(info.kind, "integrity");
        assert!(info.hint.is_some());
    }
}
