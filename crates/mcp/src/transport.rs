//! JSON-RPC envelopes and the line codec.
//!
//! Raw input is classified exactly once here. Everything past [`decode`]
//! works with [`Envelope`] values whose shape is already known to be valid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32000;

/// How strictly the `jsonrpc` marker is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// `"jsonrpc": "2.0"` must be present.
    #[default]
    Strict,
    /// The marker may be omitted, but if present it must still be `"2.0"`.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

/// A request whose envelope passed validation. `id: None` marks a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Map<String, Value>,
}

impl Envelope {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// An entry that could not be turned into an [`Envelope`]. It is always
/// answered, with a null id when none could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: RequestId,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Envelope),
    Rejected(Rejected),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Single(Message),
    Batch(Vec<Message>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Exactly one of `result` or `error`, enforced by the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self::failure(id, RpcError::new(code, message))
    }

    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn rpc_error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }
}

/// What goes back over the wire for one input line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Classifies one input line. `Err` carries the response for input that never
/// reaches the dispatcher: unparseable text and empty batches.
pub fn decode(line: &str, strictness: Strictness) -> Result<Incoming, JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        JsonRpcResponse::error(RequestId::Null, PARSE_ERROR, format!("Parse error: {}", e))
    })?;

    match value {
        Value::Array(items) if items.is_empty() => Err(JsonRpcResponse::error(
            RequestId::Null,
            INVALID_REQUEST,
            "Invalid Request: empty batch",
        )),
        Value::Array(items) => Ok(Incoming::Batch(
            items
                .into_iter()
                .map(|item| classify(item, strictness))
                .collect(),
        )),
        single => Ok(Incoming::Single(classify(single, strictness))),
    }
}

/// Serializes a reply as a single line.
pub fn encode(reply: &Reply) -> String {
    serde_json::to_string(reply).unwrap_or_else(|e| {
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"failed to encode response: {}"}}}}"#,
            INTERNAL_ERROR,
            e.to_string().replace('"', "'")
        )
    })
}

fn classify(value: Value, strictness: Strictness) -> Message {
    match validate(value, strictness) {
        Ok(envelope) => Message::Request(envelope),
        Err(rejected) => Message::Rejected(rejected),
    }
}

fn validate(value: Value, strictness: Strictness) -> Result<Envelope, Rejected> {
    let Value::Object(mut object) = value else {
        return Err(invalid(RequestId::Null, "request must be a JSON object"));
    };

    let id = match object.remove("id") {
        None => None,
        Some(raw) => Some(parse_id(raw).ok_or_else(|| {
            invalid(RequestId::Null, "id must be a string, an integer or null")
        })?),
    };
    let reply_id = id.clone().unwrap_or(RequestId::Null);

    match (object.get("jsonrpc"), strictness) {
        (Some(Value::String(v)), _) if v == JSONRPC_VERSION => {}
        (None, Strictness::Lenient) => {}
        (None, Strictness::Strict) => {
            return Err(invalid(reply_id, "missing jsonrpc version marker"));
        }
        (Some(_), _) => {
            return Err(invalid(reply_id, "jsonrpc must be \"2.0\""));
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.trim().is_empty() => method,
        Some(Value::String(_)) => return Err(invalid(reply_id, "method must not be empty")),
        Some(_) => return Err(invalid(reply_id, "method must be a string")),
        None => return Err(invalid(reply_id, "missing method")),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params,
        Some(Value::Array(_)) => {
            return Err(Rejected {
                id: reply_id,
                code: INVALID_PARAMS,
                message: "params must be an object of named parameters".to_string(),
            });
        }
        Some(_) => return Err(invalid(reply_id, "params must be an object")),
    };

    Ok(Envelope { id, method, params })
}

fn parse_id(raw: Value) -> Option<RequestId> {
    match raw {
        Value::Null => Some(RequestId::Null),
        Value::String(s) => Some(RequestId::String(s)),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

fn invalid(id: RequestId, message: &str) -> Rejected {
    Rejected {
        id,
        code: INVALID_REQUEST,
        message: format!("Invalid Request: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(line: &str, strictness: Strictness) -> Message {
        match decode(line, strictness).unwrap() {
            Incoming::Single(message) => message,
            other => panic!("expected single message, got {:?}", other),
        }
    }

    fn rejected(message: Message) -> Rejected {
        match message {
            Message::Rejected(r) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn decodes_request_with_integer_id() {
        let message = single(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#,
            Strictness::Strict,
        );
        assert_eq!(
            message,
            Message::Request(Envelope {
                id: Some(RequestId::Number(7)),
                method: "tools/list".into(),
                params: Map::new(),
            })
        );
    }

    #[test]
    fn absent_id_is_a_notification_but_null_id_is_not() {
        let Message::Request(note) = single(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            Strictness::Strict,
        ) else {
            panic!("expected request");
        };
        assert!(note.is_notification());

        let Message::Request(req) =
            single(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#, Strictness::Strict)
        else {
            panic!("expected request");
        };
        assert_eq!(req.id, Some(RequestId::Null));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let response = decode("{not json", Strictness::Strict).unwrap_err();
        assert_eq!(response.id, RequestId::Null);
        assert_eq!(response.rpc_error().unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn empty_batch_is_invalid() {
        let response = decode("[]", Strictness::Strict).unwrap_err();
        assert_eq!(response.rpc_error().unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn strict_mode_requires_version_marker() {
        let r = rejected(single(r#"{"id":"a","method":"ping"}"#, Strictness::Strict));
        assert_eq!(r.code, INVALID_REQUEST);
        assert_eq!(r.id, RequestId::String("a".into()));
    }

    #[test]
    fn lenient_mode_accepts_missing_marker_only() {
        assert!(matches!(
            single(r#"{"id":1,"method":"ping"}"#, Strictness::Lenient),
            Message::Request(_)
        ));

        let r = rejected(single(
            r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#,
            Strictness::Lenient,
        ));
        assert_eq!(r.code, INVALID_REQUEST);
    }

    #[test]
    fn empty_or_missing_method_is_rejected() {
        for line in [
            r#"{"jsonrpc":"2.0","id":1,"method":""}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":42}"#,
        ] {
            let r = rejected(single(line, Strictness::Strict));
            assert_eq!(r.code, INVALID_REQUEST, "{}", line);
            assert_eq!(r.id, RequestId::Number(1));
        }
    }

    #[test]
    fn unusable_ids_are_rejected_with_null_id() {
        let r = rejected(single(
            r#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#,
            Strictness::Strict,
        ));
        assert_eq!(r.id, RequestId::Null);
    }

    #[test]
    fn positional_params_are_invalid_params() {
        let r = rejected(single(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[1]}"#,
            Strictness::Strict,
        ));
        assert_eq!(r.code, INVALID_PARAMS);
    }

    #[test]
    fn non_object_batch_entries_are_rejected_individually() {
        let Incoming::Batch(messages) = decode(
            r#"[1, {"jsonrpc":"2.0","id":2,"method":"ping"}]"#,
            Strictness::Strict,
        )
        .unwrap() else {
            panic!("expected batch");
        };

        assert!(matches!(messages[0], Message::Rejected(_)));
        assert!(matches!(messages[1], Message::Request(_)));
    }

    #[test]
    fn response_carries_exactly_one_outcome() {
        let ok = serde_json::to_value(JsonRpcResponse::success(
            RequestId::String("x".into()),
            json!({ "a": 1 }),
        ))
        .unwrap();
        assert_eq!(ok, json!({ "jsonrpc": "2.0", "id": "x", "result": { "a": 1 } }));

        let err = serde_json::to_value(JsonRpcResponse::error(RequestId::Null, METHOD_NOT_FOUND, "nope"))
            .unwrap();
        assert_eq!(
            err,
            json!({ "jsonrpc": "2.0", "id": null, "error": { "code": -32601, "message": "nope" } })
        );
    }

    #[test]
    fn batch_reply_encodes_as_array() {
        let line = encode(&Reply::Batch(vec![JsonRpcResponse::success(
            RequestId::Number(1),
            json!({}),
        )]));
        assert_eq!(line, r#"[{"jsonrpc":"2.0","id":1,"result":{}}]"#);
    }
}
