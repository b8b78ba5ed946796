// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Wire shapes for the DHT's four RPCs (`ping`, `find_node`, `find_value`,
//! `store`), carried over plain HTTP between DHT nodes. Every message
//! carries the sender's node id (via `from`), a transaction id, and the
//! protocol version byte, per the DHT wire protocol.

use serde::{Deserialize, Serialize};

use super::kbucket::{Contact, NodeId};

/// Protocol version byte carried on every DHT RPC message.
pub const DHT_PROTOCOL_VERSION: u8 = 0x01;

/// Hex-encoded 16-byte random transaction id.
pub type TxnId = String;

/// Generate a fresh transaction id for an outgoing RPC.
#[must_use]
pub fn new_txn_id() -> TxnId {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub from: Contact,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub node_id: NodeId,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindNodeRequest {
    pub from: Contact,
    pub target: NodeId,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindNodeResponse {
    pub contacts: Vec<Contact>,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindValueRequest {
    pub from: Contact,
    pub key: String,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FindValueResponse {
    Found {
        value: serde_json::Value,
        last_seen: i64,
        txn_id: TxnId,
        version: u8,
    },
    NotFound {
        contacts: Vec<Contact>,
        txn_id: TxnId,
        version: u8,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub from: Contact,
    pub key: String,
    pub value: serde_json::Value,
    pub ttl_s: u64,
    pub publisher: NodeId,
    pub txn_id: TxnId,
    pub version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResponse {
    pub ack: bool,
    pub txn_id: TxnId,
    pub version: u8,
}

/// Response to any message type this node does not recognize. Concrete RPCs
/// are dispatched by HTTP path, so this is served from the DHT router's
/// fallback handler for any other path under `/dht/*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsupportedResponse {
    pub result: &'static str,
}

impl Default for UnsupportedResponse {
    fn default() -> Self {
        Self { result: "unsupported" }
    }
}
