//! Node manager: the per-node actor driving a router over a transport
//!
//! Inbound payloads, neighbor events, local commands and probe ticks are all
//! serialized onto one task, so the router needs no locking.

use crate::error::NodeError;
use crate::transport::{Transport, TransportEvent};
use netroute_routing::{Delivery, Effect, Router, RouterStats, RoutingError};
use netroute_wire::{codec, NodeId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Timing of the link prober
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interval between echo probe rounds
    pub probe_interval: Duration,
    /// Age after which an unanswered probe counts as lost
    pub echo_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            echo_timeout: Duration::from_secs(5),
        }
    }
}

/// Request from local code to the node actor
#[derive(Debug)]
pub enum NodeCommand {
    /// Originate application data towards a destination
    Send {
        /// Destination node
        destination: NodeId,
        /// Application data
        data: String,
        /// Outcome of the routing attempt
        reply: oneshot::Sender<Result<(), RoutingError>>,
    },
    /// Snapshot the router statistics
    Stats {
        /// Where to send the snapshot
        reply: oneshot::Sender<RouterStats>,
    },
}

/// Cloneable handle for talking to a running [`NodeManager`]
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    /// Originate `data` towards `destination`.
    ///
    /// Fails when the destination is unknown or has no route.
    pub async fn send(&self, destination: NodeId, data: impl Into<String>) -> Result<(), NodeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::Send {
                destination,
                data: data.into(),
                reply,
            })
            .await
            .map_err(|_| NodeError::Stopped)?;

        rx.await.map_err(|_| NodeError::Stopped)?.map_err(NodeError::from)
    }

    /// Current router statistics
    pub async fn stats(&self) -> Result<RouterStats, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::Stats { reply })
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }
}

/// Actor owning one node's router and transport
pub struct NodeManager<T: Transport> {
    router: Router,
    transport: Arc<T>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<NodeCommand>,
    delivery_tx: Option<mpsc::UnboundedSender<Delivery>>,
    config: NodeConfig,
}

impl<T: Transport> NodeManager<T> {
    /// Create a new node manager and the handle used to command it
    pub fn new(
        router: Router,
        transport: Arc<T>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        config: NodeConfig,
    ) -> (Self, NodeHandle) {
        let (commands_tx, commands) = mpsc::channel(64);
        let manager = Self {
            router,
            transport,
            events,
            commands,
            delivery_tx: None,
            config,
        };
        (manager, NodeHandle { commands: commands_tx })
    }

    /// Set the delivery sender (payloads surfaced to the local user)
    pub fn set_delivery_sender(&mut self, tx: mpsc::UnboundedSender<Delivery>) {
        self.delivery_tx = Some(tx);
    }

    /// Run the node until `shutdown` resolves. Returns the final statistics.
    pub async fn run<F>(mut self, shutdown: F) -> RouterStats
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting node manager for {} at {} ({})",
            self.router.local_node_id(),
            self.transport.local_address(),
            self.router.mode()
        );

        let effects = self.router.start(Instant::now());
        self.apply(effects).await;

        let mut probe = tokio::time::interval(self.config.probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and start() already probed
        probe.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Node manager for {} shutting down", self.router.local_node_id());
                    break;
                }

                Some(event) = self.events.recv() => {
                    self.handle_event(event).await;
                }

                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }

                _ = probe.tick() => {
                    let now = Instant::now();
                    let mut effects = self.router.expire_probes(now, self.config.echo_timeout);
                    effects.extend(self.router.probe_neighbors(now));
                    self.apply(effects).await;
                }
            }
        }

        self.router.stats()
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        let now = Instant::now();
        let effects = match event {
            TransportEvent::Received { from, payload } => {
                self.router.handle_inbound(&from, &payload, now)
            }
            TransportEvent::NeighborReachable { address } => {
                self.router.neighbor_reachable(&address, now)
            }
        };
        self.apply(effects).await;
    }

    async fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Send {
                destination,
                data,
                reply,
            } => {
                let result = match self.router.originate(&destination, data) {
                    Ok(effects) => {
                        self.apply(effects).await;
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Cannot send to {}: {}", destination, e);
                        Err(e)
                    }
                };
                if reply.send(result).is_err() {
                    debug!("Send requester for {} went away", destination);
                }
            }
            NodeCommand::Stats { reply } => {
                if reply.send(self.router.stats()).is_err() {
                    debug!("Stats requester went away");
                }
            }
        }
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { to, payload } => {
                    let raw = match codec::encode(&payload) {
                        Ok(raw) => raw,
                        Err(e) => {
                            error!("Failed to encode {} for {}: {}", payload.kind(), to, e);
                            continue;
                        }
                    };
                    if let Err(e) = self.transport.send(&to, raw).await {
                        warn!("Failed to send {} to {}: {}", payload.kind(), to, e);
                    }
                }
                Effect::Deliver(delivery) => {
                    info!("Delivered {}", delivery);
                    if let Some(tx) = &self.delivery_tx {
                        if tx.send(delivery).is_err() {
                            debug!("Delivery receiver dropped");
                        }
                    }
                }
            }
        }
    }
}
