//! Messages crossing the bridge and the outbound queue.
//!
//! Inbound messages are produced by the transport when client script calls a
//! callback or an RPC method. Outbound messages are everything the server sends
//! to the client. They all share one FIFO channel so the client sees state
//! updates, callback invocations and client RPC calls in server order.

use bridge_types::{ClientValue, ConnectorId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{BridgeError, BridgeResult};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// What the client asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Invocation {
    /// A registered callback, by name
    Callback {
        name: String,
        #[serde(default)]
        args: Vec<ClientValue>,
    },
    /// An RPC method, optionally qualified by interface
    Rpc {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interface: Option<String>,
        method: String,
        #[serde(default)]
        args: Vec<ClientValue>,
    },
}

/// An invocation from client script, addressed to one connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundInvocation {
    pub connector_id: ConnectorId,
    pub invocation: Invocation,
}

impl InboundInvocation {
    pub fn callback(connector_id: impl Into<ConnectorId>, name: impl Into<String>, args: Vec<ClientValue>) -> Self {
        Self {
            connector_id: connector_id.into(),
            invocation: Invocation::Callback {
                name: name.into(),
                args,
            },
        }
    }

    pub fn rpc(
        connector_id: impl Into<ConnectorId>,
        interface: Option<&str>,
        method: impl Into<String>,
        args: Vec<ClientValue>,
    ) -> Self {
        Self {
            connector_id: connector_id.into(),
            invocation: Invocation::Rpc {
                interface: interface.map(str::to_string),
                method: method.into(),
                args,
            },
        }
    }

    /// Parse the JSON wire form
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// What the server sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundPayload {
    /// Full shared state snapshot
    State { state: ClientValue },
    /// Call a function the client assigned under `name`
    InvokeCallback { name: String, args: Vec<ClientValue> },
    /// Call a client-side RPC handler
    ClientRpc {
        interface: String,
        method: String,
        args: Vec<ClientValue>,
    },
}

/// A message from the server to one connector's client side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub connector_id: ConnectorId,
    pub payload: OutboundPayload,
}

impl OutboundMessage {
    pub fn new(connector_id: ConnectorId, payload: OutboundPayload) -> Self {
        Self {
            connector_id,
            payload,
        }
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Sending half of the outbound FIFO
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl OutboundQueue {
    /// Create a queue and the receiver the transport drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a message. Fails only when the receiver is gone.
    pub fn send(&self, message: OutboundMessage) -> BridgeResult<()> {
        self.tx.send(message).map_err(|_| BridgeError::ChannelClosed)
    }

    /// Check if the receiving side was dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
