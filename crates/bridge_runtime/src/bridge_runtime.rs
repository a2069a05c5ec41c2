//! Bridge Runtime - Server side of the script connector bridge
//!
//! A [`JavaScriptBridge`] is attached to one server-side connector and lets
//! server code and client script talk to each other:
//!
//! - Callbacks: named functions the client invokes on the server ([`CallbackRegistry`])
//! - Client callbacks: named functions the server invokes on the client
//! - RPC: server interfaces exposed to the client through proxies ([`RpcRegistry`])
//! - Shared state pushed to the client as one object
//!
//! Everything going out is queued on a single FIFO ([`OutboundQueue`]), so the
//! client observes messages in the order the server produced them.
//! [`ClientConnector`] models the client end for hosts and tests.

mod bridge;
mod callback;
mod client_connector;
mod config;
mod error;
mod identity;
mod message;
mod rpc;
mod telemetry;
mod wrapper;

pub use bridge::*;
pub use callback::*;
pub use client_connector::*;
pub use config::*;
pub use error::*;
pub use identity::*;
pub use message::*;
pub use rpc::*;
pub use telemetry::*;
pub use wrapper::*;
