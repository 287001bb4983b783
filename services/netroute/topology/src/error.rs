//! Topology error types.

use netroute_wire::{Address, NodeId};
use thiserror::Error;

/// Errors raised while loading or validating the static topology
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A configuration document could not be parsed or has the wrong tag
    #[error("invalid {expected} document: {reason}")]
    InvalidDocument {
        /// Expected document tag (`topo` or `names`)
        expected: &'static str,
        /// What went wrong
        reason: String,
    },

    /// A node is referenced but has no topology entry
    #[error("node '{0}' not found in topology")]
    MissingFromTopology(NodeId),

    /// A node is referenced but has no transport address
    #[error("node '{0}' has no address")]
    MissingAddress(NodeId),

    /// Two nodes map to the same transport address
    #[error("address '{address}' is shared by '{first}' and '{second}'")]
    DuplicateAddress {
        /// The shared address
        address: Address,
        /// First node using it
        first: NodeId,
        /// Second node using it
        second: NodeId,
    },
}

/// No shortest path from the local node to the destination is known
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no known path to {destination}")]
pub struct UnreachableDestination {
    /// Requested destination
    pub destination: NodeId,
}
