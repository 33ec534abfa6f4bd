//! Frame shapes exchanged with the remote application.
//!
//! Outbound: `{"type": <command>, "params": {...}, "request_id": <id>}`.
//! Inbound: a response carrying `request_id` and `status`, or an unsolicited
//! `{"type": "event", ...}` frame.

use cadlink_events::JsonMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::MuxError;

const DEFAULT_REMOTE_ERROR: &str = "Unknown error from remote application";

#[derive(Debug, Serialize)]
pub struct CommandFrame<'a> {
    #[serde(rename = "type")]
    pub command_type: &'a str,
    pub params: &'a JsonValue,
    pub request_id: &'a str,
}

impl CommandFrame<'_> {
    /// Serialised frame, newline terminated.
    pub fn encode(&self) -> Result<Vec<u8>, MuxError> {
        let mut bytes = serde_json::to_vec(self)
            .map_err(|err| MuxError::protocol(format!("encode command: {err}")))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// One decoded inbound frame, sorted by what the receive loop must do with it.
#[derive(Debug)]
pub enum Inbound {
    Response { request_id: String, outcome: Result<JsonValue, MuxError> },
    Event(JsonMap),
    Unrecognized { reason: &'static str, frame: JsonValue },
}

pub fn classify(frame: JsonValue) -> Inbound {
    let JsonValue::Object(mut map) = frame else {
        return Inbound::Unrecognized { reason: "not a json object", frame };
    };
    if map.get("type").and_then(JsonValue::as_str) == Some("event") {
        return Inbound::Event(map);
    }
    match map.remove("request_id") {
        Some(JsonValue::String(request_id)) => {
            Inbound::Response { request_id, outcome: response_outcome(map) }
        }
        Some(other) => {
            map.insert("request_id".into(), other);
            Inbound::Unrecognized { reason: "request_id is not a string", frame: map.into() }
        }
        None => Inbound::Unrecognized { reason: "neither response nor event", frame: map.into() },
    }
}

/// Maps a response body to the caller-visible outcome.
///
/// `"ok"` or a missing status yields `result` (default `{}`), `"error"` yields
/// [`MuxError::Remote`] and any other status is a protocol violation.
pub fn response_outcome(mut body: JsonMap) -> Result<JsonValue, MuxError> {
    match body.get("status") {
        None => Ok(take_result(&mut body)),
        Some(JsonValue::String(status)) if status == "ok" => Ok(take_result(&mut body)),
        Some(JsonValue::String(status)) if status == "error" => {
            let message = body
                .get("message")
                .and_then(JsonValue::as_str)
                .filter(|message| !message.is_empty())
                .unwrap_or(DEFAULT_REMOTE_ERROR);
            Err(MuxError::remote(message))
        }
        Some(other) => Err(MuxError::protocol(format!("unexpected response status {other}"))),
    }
}

fn take_result(body: &mut JsonMap) -> JsonValue {
    match body.remove("result") {
        None | Some(JsonValue::Null) => JsonValue::Object(JsonMap::new()),
        Some(result) => result,
    }
}
