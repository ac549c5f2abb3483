use std::fmt;

use serde_json::{json, Map, Value};

use crate::failure::StorageFailure;

pub const KEEPALIVE_TYPE: &str = "keepalive";
pub const KEEPALIVE_RESPONSE_TYPE: &str = "keepalive_response";

/// Remote operation kinds carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Put,
    Get,
    Delete,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound frames, dispatched by discriminator.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// A correlated response. `failure` is present when the remote reported
    /// `error`/`errorName`; otherwise `result` carries the answer (JSON null
    /// when the remote sent none).
    Response {
        id: u64,
        result: Value,
        failure: Option<StorageFailure>,
    },
    /// Keepalive acknowledgement; consumed without correlation.
    KeepaliveAck,
    /// Global authentication failure, untied to any request id. Severs the
    /// connection.
    SecurityFailure(StorageFailure),
}

#[derive(Debug)]
pub enum WireError {
    InvalidJson(serde_json::Error),
    FrameMustBeObject,
    InvalidIdField,
    UnrecognizedFrame { summary: String },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(source) => write!(f, "frame is not valid JSON: {source}"),
            Self::FrameMustBeObject => write!(f, "frame must be a JSON object"),
            Self::InvalidIdField => write!(f, "frame field 'id' must be an unsigned integer"),
            Self::UnrecognizedFrame { summary } => {
                write!(f, "frame carries no known discriminator: {summary}")
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Serializes an outbound operation as one JSON text line.
pub fn encode_request(id: u64, op: OpKind, key: &Value, value: Option<&Value>) -> String {
    let mut frame = Map::new();
    frame.insert("id".to_owned(), json!(id));
    frame.insert("op".to_owned(), json!(op.as_str()));
    frame.insert("key".to_owned(), key.clone());
    if let Some(value) = value {
        frame.insert("value".to_owned(), value.clone());
    }
    Value::Object(frame).to_string()
}

/// Serializes an uncorrelated keepalive carrying the client timestamp.
pub fn encode_keepalive(timestamp_ms: i64) -> String {
    json!({
        "type": KEEPALIVE_TYPE,
        "timestamp": timestamp_ms,
    })
    .to_string()
}

/// Parses one inbound line and dispatches by discriminator: a `type` field
/// marks uncorrelated traffic, an `id` field marks a correlated response, and
/// a bare `error`/`errorName` pair is a global security failure.
pub fn classify(line: &str) -> Result<InboundFrame, WireError> {
    let value: Value = serde_json::from_str(line).map_err(WireError::InvalidJson)?;
    let Value::Object(fields) = value else {
        return Err(WireError::FrameMustBeObject);
    };

    if let Some(frame_type) = fields.get("type").and_then(Value::as_str) {
        if frame_type == KEEPALIVE_RESPONSE_TYPE {
            return Ok(InboundFrame::KeepaliveAck);
        }
        return Err(WireError::UnrecognizedFrame {
            summary: format!("unknown frame type '{frame_type}'"),
        });
    }

    if let Some(raw_id) = fields.get("id") {
        let id = raw_id.as_u64().ok_or(WireError::InvalidIdField)?;
        let failure = parse_reported_failure(&fields);
        let result = fields.get("result").cloned().unwrap_or(Value::Null);
        return Ok(InboundFrame::Response {
            id,
            result,
            failure,
        });
    }

    if let Some(failure) = parse_reported_failure(&fields) {
        if failure.is_security() {
            return Ok(InboundFrame::SecurityFailure(failure));
        }
        return Err(WireError::UnrecognizedFrame {
            summary: format!("uncorrelated error with name '{}'", failure.name),
        });
    }

    Err(WireError::UnrecognizedFrame {
        summary: "no 'type', 'id' or 'error' field present".to_owned(),
    })
}

fn parse_reported_failure(fields: &Map<String, Value>) -> Option<StorageFailure> {
    let message = fields.get("error").and_then(Value::as_str)?;
    let name = fields.get("errorName").and_then(Value::as_str);
    Some(StorageFailure::remote(name, message))
}
