//! Line protocol spoken by `cadlinkd` to its own clients.
//!
//! A request is one JSON object per line, `{"id": .., "command": "..", "params": {..}}`. `id`
//! is echoed verbatim and may be any JSON value. Replies are
//! `{"id": .., "status": "ok", "result": ..}` or
//! `{"id": .., "status": "error", "error_kind": "..", "message": ".."}`.

use cadlink_mux::MuxError;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

pub const INVALID_REQUEST: &str = "invalid_request";
pub const INVALID_PARAMS: &str = "invalid_params";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: JsonValue,
    pub command: String,
    #[serde(default)]
    pub params: JsonValue,
}

impl Request {
    /// Parses one line. The error is the reply to send back.
    pub fn parse(line: &str) -> Result<Self, JsonValue> {
        let value: JsonValue = serde_json::from_str(line)
            .map_err(|err| error_reply(&JsonValue::Null, INVALID_REQUEST, &format!("invalid json: {err}")))?;
        let id = value.get("id").cloned().unwrap_or(JsonValue::Null);
        let request: Self = serde_json::from_value(value)
            .map_err(|err| error_reply(&id, INVALID_REQUEST, &format!("invalid request: {err}")))?;
        if request.command.trim().is_empty() {
            return Err(error_reply(&id, INVALID_REQUEST, "command must not be empty"));
        }
        Ok(request)
    }
}

pub fn ok_reply(id: &JsonValue, result: JsonValue) -> JsonValue {
    json!({ "id": id, "status": "ok", "result": result })
}

pub fn error_reply(id: &JsonValue, error_kind: &str, message: &str) -> JsonValue {
    json!({ "id": id, "status": "error", "error_kind": error_kind, "message": message })
}

pub fn reply(id: &JsonValue, outcome: Result<JsonValue, MuxError>) -> JsonValue {
    match outcome {
        Ok(result) => ok_reply(id, result),
        Err(MuxError::Remote { message }) => error_reply(id, "remote", &message),
        Err(err) => error_reply(id, err.kind(), &err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn request_with_defaults() {
        let request = Request::parse(r#"{"command":"get_document_info"}"#).expect("valid");
        assert_eq!(request.id, JsonValue::Null);
        assert_eq!(request.params, JsonValue::Null);
    }

    #[test]
    fn malformed_lines_become_error_replies() {
        let reply = Request::parse("{not json").expect_err("invalid");
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["error_kind"], INVALID_REQUEST);
        assert_eq!(reply["id"], JsonValue::Null);

        let reply = Request::parse(r#"{"id":7,"params":{}}"#).expect_err("no command");
        assert_eq!(reply["id"], 7);

        let reply = Request::parse(r#"{"id":"a","command":" "}"#).expect_err("empty command");
        assert_eq!(reply["message"], "command must not be empty");
    }

    #[test]
    fn failures_carry_their_kind() {
        let id = json!("req-1");
        let timeout = MuxError::Timeout {
            command_type: "get_document_info".into(),
            timeout: Duration::from_secs(15),
        };
        assert_eq!(reply(&id, Err(timeout))["error_kind"], "timeout");

        let remote = reply(&id, Err(MuxError::remote("Object not found")));
        assert_eq!(
            remote,
            json!({ "id": "req-1", "status": "error", "error_kind": "remote", "message": "Object not found" })
        );
        assert_eq!(reply(&id, Ok(json!({ "n": 1 })))["result"]["n"], 1);
    }
}
