//! Bridge Types - Value shapes and conversion rules for script connectors
//!
//! This crate contains the pure data side of the bridge between a server-side
//! connector and the dynamically-typed script that drives it on the client:
//!
//! - [`ServerValue`] - the closed set of shapes server code may hand to the bridge
//! - [`ClientValue`] - the closed set of shapes the script environment understands
//! - [`Shape`] - declared parameter/return shapes used to decode client input
//! - [`ValueCodec`] - the two-way conversion scheme, extensible with [`ValueConverter`]s
//! - [`Connector`] / [`ConnectorRegistry`] - the collaborator traits for connector identity

mod client;
mod codec;
mod connector;
mod server;
mod shape;

pub use client::*;
pub use codec::*;
pub use connector::*;
pub use server::*;
pub use shape::*;
