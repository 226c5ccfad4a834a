use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::error::RpcError;

use super::NodeId;

/// One line on the wire: `{"src": .., "dest": .., "body": {..}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Value,
}

impl Envelope {
    pub fn msg_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(Value::as_u64)
    }

    pub fn in_reply_to(&self) -> Option<u64> {
        self.body.get("in_reply_to").and_then(Value::as_u64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InitBody {
    pub node_id: NodeId,
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    #[serde(default)]
    pub text: String,
}

pub fn error_body(code: u32, text: impl Into<String>) -> Value {
    let mut body = Map::new();
    body.insert("type".into(), "error".into());
    body.insert("code".into(), code.into());
    body.insert("text".into(), Value::String(text.into()));
    Value::Object(body)
}

/// Turns a reply body into an error if the peer answered with `{"type":"error"}`.
pub fn check_reply(body: Value) -> Result<Value, RpcError> {
    if body.get("type").and_then(Value::as_str) != Some("error") {
        return Ok(body);
    }
    match serde_json::from_value::<ErrorBody>(body) {
        Ok(err) => Err(RpcError::Remote {
            code: err.code,
            text: err.text,
        }),
        Err(e) => Err(RpcError::Remote {
            code: crate::common::error::code::CRASH,
            text: format!("unreadable error reply: {}", e),
        }),
    }
}
