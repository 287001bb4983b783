//! In-process transport connecting nodes through shared channels.

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use netroute_wire::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Switchboard shared by every [`LocalTransport`] of one process
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    endpoints: Arc<RwLock<HashMap<Address, mpsc::UnboundedSender<TransportEvent>>>>,
}

impl LocalHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. Returns its transport and the receiver for its
    /// events. Registering an address again replaces the old endpoint.
    pub async fn register(
        &self,
        address: Address,
    ) -> (LocalTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.endpoints.write().await.insert(address.clone(), tx).is_some() {
            debug!("Replaced local endpoint {}", address);
        }

        let transport = LocalTransport {
            address,
            hub: self.clone(),
        };
        (transport, rx)
    }

    /// Raise neighbor-reachable events on both ends of a link
    pub async fn connect(&self, a: &Address, b: &Address) -> Result<(), TransportError> {
        let endpoints = self.endpoints.read().await;
        let a_tx = endpoints
            .get(a)
            .ok_or_else(|| TransportError::UnknownAddress(a.clone()))?;
        let b_tx = endpoints
            .get(b)
            .ok_or_else(|| TransportError::UnknownAddress(b.clone()))?;

        a_tx.send(TransportEvent::NeighborReachable { address: b.clone() })
            .map_err(|_| TransportError::Closed(a.clone()))?;
        b_tx.send(TransportEvent::NeighborReachable { address: a.clone() })
            .map_err(|_| TransportError::Closed(b.clone()))?;

        info!("Linked local endpoints {} <-> {}", a, b);
        Ok(())
    }

    /// Remove an endpoint; later sends to it fail
    pub async fn unregister(&self, address: &Address) {
        self.endpoints.write().await.remove(address);
    }
}

/// One node's handle on a [`LocalHub`]
#[derive(Debug, Clone)]
pub struct LocalTransport {
    address: Address,
    hub: LocalHub,
}

#[async_trait]
impl Transport for LocalTransport {
    fn local_address(&self) -> &Address {
        &self.address
    }

    async fn send(&self, to: &Address, payload: String) -> Result<(), TransportError> {
        let endpoints = self.hub.endpoints.read().await;
        let tx = endpoints
            .get(to)
            .ok_or_else(|| TransportError::UnknownAddress(to.clone()))?;

        tx.send(TransportEvent::Received {
            from: self.address.clone(),
            payload,
        })
        .map_err(|_| TransportError::Closed(to.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_registered_endpoint() {
        let hub = LocalHub::new();
        let (a, _a_rx) = hub.register(Address::from("a@local")).await;
        let (_b, mut b_rx) = hub.register(Address::from("b@local")).await;

        a.send(&Address::from("b@local"), "ping".to_string()).await.unwrap();

        assert_eq!(
            b_rx.recv().await.unwrap(),
            TransportEvent::Received {
                from: Address::from("a@local"),
                payload: "ping".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_connect_notifies_both_ends() {
        let hub = LocalHub::new();
        let (_a, mut a_rx) = hub.register(Address::from("a@local")).await;
        let (_b, mut b_rx) = hub.register(Address::from("b@local")).await;

        hub.connect(&Address::from("a@local"), &Address::from("b@local"))
            .await
            .unwrap();

        assert_eq!(
            a_rx.recv().await.unwrap(),
            TransportEvent::NeighborReachable {
                address: Address::from("b@local")
            }
        );
        assert_eq!(
            b_rx.recv().await.unwrap(),
            TransportEvent::NeighborReachable {
                address: Address::from("a@local")
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_and_closed_endpoints_fail() {
        let hub = LocalHub::new();
        let (a, _a_rx) = hub.register(Address::from("a@local")).await;

        let err = a.send(&Address::from("nobody"), "x".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownAddress(_)));

        let (_b, b_rx) = hub.register(Address::from("b@local")).await;
        drop(b_rx);
        let err = a.send(&Address::from("b@local"), "x".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));

        hub.unregister(&Address::from("b@local")).await;
        assert!(hub
            .connect(&Address::from("a@local"), &Address::from("b@local"))
            .await
            .is_err());
    }
}
