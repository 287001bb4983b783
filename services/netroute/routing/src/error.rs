//! Routing error types.

use netroute_topology::UnreachableDestination;
use netroute_wire::{Address, NodeId, WireError};
use thiserror::Error;

/// Errors raised by the routing layer. None of them is fatal to the node.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// Unparseable payload or missing required fields
    #[error("malformed payload: {0}")]
    Malformed(#[from] WireError),

    /// Flooded payload without a message id
    #[error("flooded payload from {0} carries no messageId")]
    MissingMessageId(NodeId),

    /// Payload from an address or origin with no mapping or outstanding probe
    #[error("unknown peer {address}: {reason}")]
    UnknownPeer {
        /// Address the payload came from
        address: Address,
        /// Why the peer was rejected
        reason: &'static str,
    },

    /// No path to the destination is known
    #[error(transparent)]
    Unreachable(#[from] UnreachableDestination),

    /// Destination is not part of the directory
    #[error("node '{0}' is not part of the network")]
    UnknownNode(NodeId),
}

impl RoutingError {
    /// Shorthand for an unreachable destination
    pub fn unreachable(destination: &NodeId) -> Self {
        RoutingError::Unreachable(UnreachableDestination {
            destination: destination.clone(),
        })
    }
}

/// Routing mode name that matches no known mode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown routing mode '{0}' (expected flooding, distance_vector or link_state)")]
pub struct ParseModeError(pub String);
