//! # muxrpc-client
//!
//! Multiplexed RPC client.
//!
//! Many logical calls share one persistent connection. Each request carries a
//! call identifier; a single receive task reads every response off the stream
//! and hands it to the caller that registered that identifier.
//!
//! This crate provides:
//! - `Connection`: call identifiers, the pending-call registry, the sender
//!   and the receive task
//! - `Client`: typed JSON calls on top of a shared connection
//! - TCP and TLS dialing

pub mod client;
pub mod connection;
pub mod dial;
pub mod error;
pub mod nonce;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use connection::{
    Connection, ConnectionConfig, InboundMessage, TlsClientConfig, DEFAULT_CALL_TIMEOUT,
};
pub use error::ClientError;
pub use nonce::NonceAllocator;
pub use registry::{PendingCall, PendingCalls};
