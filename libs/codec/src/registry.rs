//! Registry request/reply encoding
//!
//! Requests are plain text, `"<resolve-path>:<pid>"`. Replies are JSON
//! objects with `identifier`, `server`, `port` and `pid` keys; anything else
//! in the object is ignored.

use crate::{trim_nul, CodecError};
use serde::{Deserialize, Serialize};
use types::{resolve_path, strip_resolve_prefix, PortRecord};

/// Encode the request resolving `path` on behalf of process `pid`
pub fn encode_request(path: &str, pid: &str) -> Vec<u8> {
    format!("{}:{}", resolve_path(path), pid).into_bytes()
}

/// Decoded registry request, as seen by the registry process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Port path with the resolve prefix removed
    pub path: String,
    /// Requesting process, empty when the caller sent none
    pub pid: String,
}

impl ResolveRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(trim_nul(payload))
            .map_err(|_| CodecError::invalid_utf8("registry request"))?;
        let text = text.trim();

        let (path, pid) = text.rsplit_once(':').unwrap_or((text, ""));
        let path = strip_resolve_prefix(path);
        if path.is_empty() || path == "/" {
            return Err(CodecError::MalformedRequest {
                reason: format!("no port path in {:?}", text),
            });
        }

        Ok(Self {
            path: path.to_string(),
            pid: pid.to_string(),
        })
    }
}

/// Registry reply body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReply {
    pub identifier: String,
    pub server: String,
    pub port: String,
    pub pid: String,
}

impl ResolveReply {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::malformed_reply(e.to_string()))
    }
}

impl From<&PortRecord> for ResolveReply {
    fn from(record: &PortRecord) -> Self {
        Self {
            identifier: record.name.clone(),
            server: record.host.clone(),
            port: record.port.clone(),
            pid: record.pid.clone(),
        }
    }
}

/// Fill `record` from a registry reply.
///
/// `server` becomes the host, `port` and `pid` are copied. A reply whose
/// `identifier` names a different path is rejected. The record is only
/// modified when the whole reply is usable.
pub fn decode_reply(payload: &[u8], record: &mut PortRecord) -> Result<(), CodecError> {
    let value: serde_json::Value = serde_json::from_slice(trim_nul(payload))
        .map_err(|e| CodecError::malformed_reply(format!("not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| CodecError::malformed_reply("expected a JSON object"))?;

    let mut resolved = record.clone();
    for (key, field) in object {
        match key.as_str() {
            "server" => resolved.host = field_text(key, field)?,
            "port" => resolved.port = field_text(key, field)?,
            "pid" => resolved.pid = field_text(key, field)?,
            "identifier" => {
                let identifier = field_text(key, field)?;
                if !identifier.is_empty()
                    && strip_resolve_prefix(&identifier) != strip_resolve_prefix(&record.name)
                {
                    return Err(CodecError::malformed_reply(format!(
                        "reply names {} but {} was requested",
                        identifier, record.name
                    )));
                }
            }
            _ => {}
        }
    }

    if !resolved.is_resolved() {
        return Err(CodecError::malformed_reply(format!(
            "reply for {} has no server/port",
            record.name
        )));
    }

    *record = resolved;
    Ok(())
}

fn field_text(key: &str, field: &serde_json::Value) -> Result<String, CodecError> {
    match field {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(CodecError::malformed_reply(format!(
            "field {:?} should be text, got {}",
            key, other
        ))),
    }
}
