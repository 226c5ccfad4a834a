use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::error::RpcError;
use crate::network::NodeId;

/*
    A client broadcast carries only the value. When a node gossips the
    value on, it adds the acceptance timestamp the value was first stored
    under and the history of nodes the value has already passed through,
    so every node stores the value under the same key and never sends it
    back along the path it came from.
*/

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Broadcast {
        message: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<Vec<NodeId>>,
    },
    Read,
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    BroadcastOk,
    ReadOk { messages: Vec<i64> },
    TopologyOk,
}

impl Request {
    /// The message a node sends to its peers for a value it has accepted.
    pub fn propagation(value: i64, timestamp: i64, history: Vec<NodeId>) -> Self {
        Request::Broadcast {
            message: value,
            timestamp: Some(timestamp),
            history: Some(history),
        }
    }

    pub fn to_body(&self) -> Result<Value, RpcError> {
        serde_json::to_value(self).map_err(|e| RpcError::Encode(e.to_string()))
    }
}
