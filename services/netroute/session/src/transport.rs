//! Transport abstraction between the node actor and the network.

use crate::error::TransportError;
use async_trait::async_trait;
use netroute_wire::Address;

/// Notification raised by a transport towards its node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A payload arrived from a peer
    Received {
        /// Sender's address
        from: Address,
        /// Raw payload text
        payload: String,
    },
    /// A neighbor became reachable
    NeighborReachable {
        /// The neighbor's address
        address: Address,
    },
}

/// Delivers opaque text payloads between addresses.
///
/// Sends are best effort: an `Ok` only means the payload was handed off.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Our own address, as peers know it
    fn local_address(&self) -> &Address;

    /// Send a payload to `to`
    async fn send(&self, to: &Address, payload: String) -> Result<(), TransportError>;
}
