//! Error types for the bridge runtime.

use bridge_types::{ConnectorId, ConversionError};

/// Errors that can occur while dispatching between server and client.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown callback: {0}")]
    UnknownCallback(String),

    #[error("Method '{method}' is declared by more than one RPC interface: {}", .interfaces.join(", "))]
    AmbiguousMethodName {
        method: String,
        interfaces: Vec<String>,
    },

    #[error("RPC interface not registered: {0}")]
    UnknownInterface(String),

    #[error("Unknown RPC method: {method}")]
    UnknownMethod {
        interface: Option<String>,
        method: String,
    },

    #[error("RPC interface {interface} declares '{method}' more than once")]
    OverloadedMethod { interface: String, method: String },

    #[error("'{name}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Handler for '{name}' failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invocation for connector {actual} reached the bridge of {expected}")]
    WrongConnector {
        expected: ConnectorId,
        actual: ConnectorId,
    },

    #[error("Outbound channel closed")]
    ChannelClosed,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
