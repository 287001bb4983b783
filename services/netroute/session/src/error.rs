//! Session error types.

use netroute_routing::RoutingError;
use netroute_wire::Address;
use thiserror::Error;

/// Transport-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// No endpoint is registered or reachable at the address
    #[error("no endpoint at {0}")]
    UnknownAddress(Address),

    /// The receiving side has gone away
    #[error("endpoint {0} is closed")]
    Closed(Address),

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope could not be encoded or decoded
    #[error("envelope error: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Failures surfaced through a [`crate::NodeHandle`]
#[derive(Error, Debug)]
pub enum NodeError {
    /// The router rejected the request
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The node manager is no longer running
    #[error("node manager stopped")]
    Stopped,
}
