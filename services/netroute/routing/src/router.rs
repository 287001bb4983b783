//! Message router: classifies inbound payloads and drives the active engine.
//!
//! The router is a plain state machine. It never touches the network itself;
//! every operation returns the [`Effect`]s the caller must carry out.

use crate::error::{ParseModeError, RoutingError};
use crate::flooding::{FloodDecision, FloodingEngine};
use crate::next_hop::{NextHop, RouteLookup};
use crate::prober::{cost_from_rtt, LinkProber};
use crate::seen::SeenMessages;
use crate::table::DistanceVectorTable;
use netroute_topology::{Directory, LinkStateDatabase, UpdateOutcome};
use netroute_wire::{
    codec, Address, EchoResponse, NodeId, Payload, RoutingTableUpdate, SendRouting,
    TerminalMessage, WeightsUpdate,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Routing algorithm a node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Forward everything to every neighbor
    #[serde(alias = "flood")]
    Flooding,
    /// Bellman-Ford style table exchange
    #[serde(alias = "dv", alias = "dvr", alias = "distance-vector")]
    DistanceVector,
    /// Versioned weight tables plus Dijkstra
    #[serde(alias = "ls", alias = "lsr", alias = "link-state")]
    LinkState,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Flooding => write!(f, "flooding"),
            Mode::DistanceVector => write!(f, "distance_vector"),
            Mode::LinkState => write!(f, "link_state"),
        }
    }
}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flooding" | "flood" => Ok(Mode::Flooding),
            "distance_vector" | "distance-vector" | "dv" | "dvr" => Ok(Mode::DistanceVector),
            "link_state" | "link-state" | "ls" | "lsr" => Ok(Mode::LinkState),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Something the caller must do on the router's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand a payload to the transport
    Send {
        /// Destination address
        to: Address,
        /// Payload to encode and send
        payload: Payload,
    },
    /// Surface a payload to the local user
    Deliver(Delivery),
}

/// Payload observed or received by this node
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Original sender
    pub from: NodeId,
    /// Intended destination, when the payload names one
    pub to: Option<NodeId>,
    /// Application data
    pub data: String,
    /// Hops travelled, when the payload carries a count
    pub hops: Option<u32>,
    /// Flood id, flooding mode only
    pub message_id: Option<String>,
}

impl Delivery {
    fn from_relay(relay: &SendRouting) -> Self {
        Self {
            from: relay.from.clone(),
            to: Some(relay.to.clone()),
            data: relay.data.clone(),
            hops: Some(relay.hops),
            message_id: relay.message_id.clone(),
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.from, self.data)?;
        if let Some(hops) = self.hops {
            write!(f, " ({} hops)", hops)?;
        }
        Ok(())
    }
}

/// Routing decision result
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Forward to next hop
    Forward(NextHop),
    /// Deliver locally (we are the destination)
    Local,
    /// Drop payload
    Drop(DropReason),
}

/// Reason for dropping a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Unparseable or missing required fields
    Malformed,
    /// Sender or origin unknown, or no matching probe
    UnknownPeer,
    /// No route to destination
    NoRoute,
    /// Destination is not part of the network
    UnknownDestination,
    /// Message id already processed
    Duplicate,
    /// Weight table version not newer than the stored one
    StaleUpdate,
    /// Payload type not understood
    Unrecognized,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Malformed => write!(f, "malformed payload"),
            DropReason::UnknownPeer => write!(f, "unknown peer"),
            DropReason::NoRoute => write!(f, "no route to destination"),
            DropReason::UnknownDestination => write!(f, "unknown destination"),
            DropReason::Duplicate => write!(f, "duplicate message"),
            DropReason::StaleUpdate => write!(f, "stale update"),
            DropReason::Unrecognized => write!(f, "unrecognized payload type"),
        }
    }
}

impl From<&RoutingError> for DropReason {
    fn from(err: &RoutingError) -> Self {
        match err {
            RoutingError::Malformed(_) | RoutingError::MissingMessageId(_) => DropReason::Malformed,
            RoutingError::UnknownPeer { .. } => DropReason::UnknownPeer,
            RoutingError::Unreachable(_) => DropReason::NoRoute,
            RoutingError::UnknownNode(_) => DropReason::UnknownDestination,
        }
    }
}

/// Router statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Local node ID
    pub local_node_id: NodeId,
    /// Active routing mode
    pub mode: Mode,
    /// Destinations with a known route, ourselves included
    pub total_routes: usize,
    /// Payloads handed to a next hop or flooded onward
    pub payloads_forwarded: u64,
    /// Payloads surfaced locally
    pub payloads_delivered: u64,
    /// Payloads dropped
    pub payloads_dropped: u64,
    /// Breakdown of drop reasons
    pub drop_reasons: BTreeMap<String, u64>,
}

impl RouterStats {
    /// Create new router statistics
    pub fn new(local_node_id: NodeId, mode: Mode) -> Self {
        Self {
            local_node_id,
            mode,
            total_routes: 0,
            payloads_forwarded: 0,
            payloads_delivered: 0,
            payloads_dropped: 0,
            drop_reasons: BTreeMap::new(),
        }
    }

    /// Count a dropped payload
    pub fn record_drop(&mut self, reason: DropReason) {
        self.payloads_dropped += 1;
        *self.drop_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Drops recorded for one reason
    pub fn drops(&self, reason: DropReason) -> u64 {
        self.drop_reasons
            .get(&reason.to_string())
            .copied()
            .unwrap_or(0)
    }
}

/// Per-mode routing state
#[derive(Debug)]
enum Engine {
    Flooding(FloodingEngine),
    DistanceVector {
        table: DistanceVectorTable,
        seen: SeenMessages,
    },
    LinkState {
        database: LinkStateDatabase,
        prober: LinkProber,
    },
}

/// One node's routing core
#[derive(Debug)]
pub struct Router {
    local_node_id: NodeId,
    directory: Arc<Directory>,
    /// Neighbors from the static topology
    neighbors: BTreeSet<NodeId>,
    /// Neighbors the transport reported as reachable
    reachable: BTreeSet<NodeId>,
    engine: Engine,
    stats: RouterStats,
}

impl Router {
    /// Create a router for `local_node_id`.
    ///
    /// `seen` backs duplicate suppression for flooded payloads and
    /// distance-vector advertisements.
    pub fn new(
        local_node_id: NodeId,
        directory: Arc<Directory>,
        mode: Mode,
        seen: SeenMessages,
    ) -> Result<Self, RoutingError> {
        if !directory.contains(&local_node_id) || directory.address_of(&local_node_id).is_none() {
            return Err(RoutingError::UnknownNode(local_node_id));
        }

        let neighbors: BTreeSet<NodeId> = directory.neighbors_of(&local_node_id).cloned().collect();

        let engine = match mode {
            Mode::Flooding => Engine::Flooding(FloodingEngine::new(
                local_node_id.clone(),
                neighbors.iter().cloned(),
                seen,
            )),
            Mode::DistanceVector => Engine::DistanceVector {
                table: DistanceVectorTable::new(local_node_id.clone()),
                seen,
            },
            Mode::LinkState => Engine::LinkState {
                database: LinkStateDatabase::new(local_node_id.clone(), neighbors.iter().cloned()),
                prober: LinkProber::new(),
            },
        };

        info!(
            "Router for {} running {} with {} neighbors",
            local_node_id,
            mode,
            neighbors.len()
        );

        Ok(Self {
            stats: RouterStats::new(local_node_id.clone(), mode),
            local_node_id,
            directory,
            neighbors,
            reachable: BTreeSet::new(),
            engine,
        })
    }

    /// Get the local node ID
    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Active routing mode
    pub fn mode(&self) -> Mode {
        match self.engine {
            Engine::Flooding(_) => Mode::Flooding,
            Engine::DistanceVector { .. } => Mode::DistanceVector,
            Engine::LinkState { .. } => Mode::LinkState,
        }
    }

    /// Directory this router resolves nodes against
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Neighbors from the static topology
    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    /// Neighbors reported reachable so far
    pub fn reachable(&self) -> &BTreeSet<NodeId> {
        &self.reachable
    }

    /// Distance-vector table, in distance-vector mode
    pub fn distance_vector(&self) -> Option<&DistanceVectorTable> {
        match &self.engine {
            Engine::DistanceVector { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Link-state database, in link-state mode
    pub fn link_state(&self) -> Option<&LinkStateDatabase> {
        match &self.engine {
            Engine::LinkState { database, .. } => Some(database),
            _ => None,
        }
    }

    /// Get routing statistics
    pub fn stats(&self) -> RouterStats {
        let mut stats = self.stats.clone();
        stats.total_routes = match &self.engine {
            Engine::Flooding(_) => 0,
            Engine::DistanceVector { table, .. } => table.len(),
            Engine::LinkState { database, .. } => database.paths().distances.len(),
        };
        stats
    }

    /// Make a routing decision for a destination-addressed payload.
    ///
    /// Flooding mode keeps no routes, so every remote destination is a drop.
    pub fn decide(&self, destination: &NodeId) -> RoutingDecision {
        if *destination == self.local_node_id {
            return RoutingDecision::Local;
        }

        match self.lookup(destination) {
            Ok(hop) => RoutingDecision::Forward(hop),
            Err(err) => RoutingDecision::Drop(DropReason::from(&err)),
        }
    }

    /// Session established: probe every neighbor in link-state mode
    pub fn start(&mut self, now: Instant) -> Vec<Effect> {
        info!("Starting {} routing on {}", self.mode(), self.local_node_id);
        self.probe_neighbors(now)
    }

    /// Send an echo probe to every static neighbor (link-state mode only)
    pub fn probe_neighbors(&mut self, now: Instant) -> Vec<Effect> {
        let Engine::LinkState { prober, .. } = &mut self.engine else {
            return Vec::new();
        };

        let mut effects = Vec::with_capacity(self.neighbors.len());
        for neighbor in &self.neighbors {
            let Some(address) = self.directory.address_of(neighbor) else {
                continue;
            };
            if prober.record_probe(address.clone(), now) {
                effects.push(Effect::Send {
                    to: address.clone(),
                    payload: Payload::Echo,
                });
            }
        }

        debug!("Probing {} neighbors of {}", effects.len(), self.local_node_id);
        effects
    }

    /// Transport reports `address` reachable: register it and share state.
    ///
    /// Only configured neighbors are registered, probed or sent tables.
    pub fn neighbor_reachable(&mut self, address: &Address, now: Instant) -> Vec<Effect> {
        let Some(neighbor) = self.directory.node_of(address).cloned() else {
            warn!("Reachable address {} is not in the directory, ignoring", address);
            return Vec::new();
        };

        if !self.neighbors.contains(&neighbor) {
            debug!("{} is reachable but not a configured neighbor of {}, ignoring", neighbor, self.local_node_id);
            return Vec::new();
        }
        if self.reachable.insert(neighbor.clone()) {
            info!("Neighbor {} ({}) is reachable", neighbor, address);
        }

        match &mut self.engine {
            Engine::Flooding(_) => Vec::new(),
            Engine::DistanceVector { table, .. } => {
                let advert = table.advert(Uuid::new_v4().to_string());
                vec![Effect::Send {
                    to: address.clone(),
                    payload: Payload::RoutingTable(advert),
                }]
            }
            Engine::LinkState { database, prober } => {
                let mut effects: Vec<Effect> = database
                    .all_adverts()
                    .into_iter()
                    .map(|advert| Effect::Send {
                        to: address.clone(),
                        payload: Payload::Weights(advert),
                    })
                    .collect();

                if prober.record_probe(address.clone(), now) {
                    effects.push(Effect::Send {
                        to: address.clone(),
                        payload: Payload::Echo,
                    });
                }
                effects
            }
        }
    }

    /// Single entry point for every inbound payload.
    ///
    /// Problems are logged and counted, never propagated.
    pub fn handle_inbound(&mut self, from: &Address, raw: &str, now: Instant) -> Vec<Effect> {
        let payload = match codec::decode(raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Dropping malformed payload from {}: {}", from, err);
                self.stats.record_drop(DropReason::Malformed);
                return Vec::new();
            }
        };

        debug!("Received {} from {}", payload.kind(), from);

        match self.dispatch(from, payload, now) {
            Ok(effects) => effects,
            Err(err) => {
                let reason = DropReason::from(&err);
                warn!("Dropping payload from {} ({}): {}", from, reason, err);
                self.stats.record_drop(reason);
                Vec::new()
            }
        }
    }

    /// Send application data towards `destination`
    pub fn originate(
        &mut self,
        destination: &NodeId,
        data: impl Into<String>,
    ) -> Result<Vec<Effect>, RoutingError> {
        if !self.directory.contains(destination) {
            return Err(RoutingError::UnknownNode(destination.clone()));
        }

        let data = data.into();

        if *destination == self.local_node_id {
            self.stats.payloads_delivered += 1;
            return Ok(vec![Effect::Deliver(Delivery {
                from: self.local_node_id.clone(),
                to: Some(destination.clone()),
                data,
                hops: Some(0),
                message_id: None,
            })]);
        }

        if let Engine::Flooding(flooding) = &mut self.engine {
            let (message_id, targets) = flooding.originate();
            info!("Flooding message {} for {} to {} neighbors", message_id, destination, targets.len());

            let relay = SendRouting::new(self.local_node_id.clone(), destination.clone(), data)
                .with_message_id(message_id);
            let effects = self.broadcast_to(targets.iter(), &Payload::SendRouting(relay));
            self.stats.payloads_forwarded += effects.len() as u64;
            return Ok(effects);
        }

        self.forward(SendRouting::new(
            self.local_node_id.clone(),
            destination.clone(),
            data,
        ))
    }

    /// Drop probes unanswered for longer than `timeout`.
    ///
    /// Links that had a measured cost fall back to the unknown cost and the
    /// new local table is broadcast.
    pub fn expire_probes(&mut self, now: Instant, timeout: Duration) -> Vec<Effect> {
        let Engine::LinkState { database, prober } = &mut self.engine else {
            return Vec::new();
        };

        let mut latest: Option<WeightsUpdate> = None;
        for address in prober.expire(now, timeout) {
            let Some(neighbor) = self.directory.node_of(&address) else {
                continue;
            };
            warn!("Echo probe to {} ({}) unanswered after {:?}", neighbor, address, timeout);
            if let Some(advert) = database.mark_link_unknown(neighbor) {
                latest = Some(advert);
            }
        }

        match latest {
            Some(advert) => self.broadcast_to(self.neighbors.iter(), &Payload::Weights(advert)),
            None => Vec::new(),
        }
    }

    fn dispatch(
        &mut self,
        from: &Address,
        payload: Payload,
        now: Instant,
    ) -> Result<Vec<Effect>, RoutingError> {
        match payload {
            Payload::Echo => Ok(vec![Effect::Send {
                to: from.clone(),
                payload: Payload::EchoResponse(EchoResponse {
                    from: Some(self.local_node_id.clone()),
                }),
            }]),
            Payload::EchoResponse(_) => self.on_echo_response(from, now),
            Payload::Weights(update) => self.on_weights(from, update),
            Payload::RoutingTable(update) => self.on_routing_table(from, update),
            Payload::SendRouting(relay) => self.on_send_routing(from, relay),
            Payload::Message(message) => Ok(self.on_message(message)),
            Payload::Unrecognized { kind } => {
                debug!("Ignoring payload of unknown type '{}' from {}", kind, from);
                self.stats.record_drop(DropReason::Unrecognized);
                Ok(Vec::new())
            }
        }
    }

    fn on_echo_response(&mut self, from: &Address, now: Instant) -> Result<Vec<Effect>, RoutingError> {
        let Engine::LinkState { database, prober } = &mut self.engine else {
            debug!("Ignoring echo_response from {} outside link-state mode", from);
            return Ok(Vec::new());
        };

        let rtt = prober
            .process_response(from, now)
            .ok_or_else(|| RoutingError::UnknownPeer {
                address: from.clone(),
                reason: "no outstanding echo probe",
            })?;
        let neighbor = self
            .directory
            .node_of(from)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownPeer {
                address: from.clone(),
                reason: "address not in directory",
            })?;

        let cost = cost_from_rtt(rtt);
        let advert = database.record_link_cost(neighbor.clone(), cost);
        info!(
            "Measured link {} -> {}: {:.3} ms (version {})",
            self.local_node_id, neighbor, cost, advert.version
        );

        Ok(self.broadcast_to(self.neighbors.iter(), &Payload::Weights(advert)))
    }

    fn on_weights(&mut self, from: &Address, update: WeightsUpdate) -> Result<Vec<Effect>, RoutingError> {
        let Engine::LinkState { database, .. } = &mut self.engine else {
            debug!("Ignoring weights from {} outside link-state mode", from);
            return Ok(Vec::new());
        };

        if self.directory.node_of(from).is_none() {
            return Err(RoutingError::UnknownPeer {
                address: from.clone(),
                reason: "address not in directory",
            });
        }
        let origin = weights_origin(&self.directory, &update.from).ok_or_else(|| {
            RoutingError::UnknownPeer {
                address: from.clone(),
                reason: "weights origin not in directory",
            }
        })?;

        let stored = WeightsUpdate {
            from: origin,
            ..update.clone()
        };
        match database.process_weights(stored) {
            UpdateOutcome::Accepted => {
                Ok(self.broadcast_to(self.neighbors.iter(), &Payload::Weights(update)))
            }
            UpdateOutcome::Stale => {
                self.stats.record_drop(DropReason::StaleUpdate);
                Ok(Vec::new())
            }
        }
    }

    fn on_routing_table(
        &mut self,
        from: &Address,
        update: RoutingTableUpdate,
    ) -> Result<Vec<Effect>, RoutingError> {
        let Engine::DistanceVector { table, seen } = &mut self.engine else {
            debug!("Ignoring routing table from {} outside distance-vector mode", from);
            return Ok(Vec::new());
        };

        if !seen.insert(&update.message_id) {
            debug!("Already processed routing table {}", update.message_id);
            self.stats.record_drop(DropReason::Duplicate);
            return Ok(Vec::new());
        }

        if !self.directory.contains(&update.from) {
            return Err(RoutingError::UnknownPeer {
                address: from.clone(),
                reason: "advertising node not in directory",
            });
        }

        if self.neighbors.contains(&update.from) {
            self.reachable.insert(update.from.clone());
        }

        if !table.merge(&update.from, &update.data.table_routes) {
            debug!("Routing table from {} brought nothing new", update.from);
            return Ok(Vec::new());
        }

        let advert = table.advert(Uuid::new_v4().to_string());
        info!(
            "Routing table of {} changed after update from {} ({} routes), re-advertising",
            self.local_node_id,
            update.from,
            advert.data.table_routes.len()
        );

        Ok(self.broadcast_to(self.reachable.iter(), &Payload::RoutingTable(advert)))
    }

    fn on_send_routing(&mut self, from: &Address, relay: SendRouting) -> Result<Vec<Effect>, RoutingError> {
        if let Engine::Flooding(flooding) = &mut self.engine {
            let message_id = relay
                .message_id
                .clone()
                .ok_or_else(|| RoutingError::MissingMessageId(relay.from.clone()))?;

            return match flooding.receive(&message_id, self.directory.node_of(from)) {
                FloodDecision::Duplicate => {
                    self.stats.record_drop(DropReason::Duplicate);
                    Ok(Vec::new())
                }
                FloodDecision::Forward { targets } => {
                    info!(
                        "Flooded message {} from {} for {}: {}",
                        message_id, relay.from, relay.to, relay.data
                    );
                    self.stats.payloads_delivered += 1;

                    let mut effects = vec![Effect::Deliver(Delivery::from_relay(&relay))];
                    let onward = self.broadcast_to(targets.iter(), &Payload::SendRouting(relay.relayed()));
                    self.stats.payloads_forwarded += onward.len() as u64;
                    effects.extend(onward);
                    Ok(effects)
                }
            };
        }

        if relay.to == self.local_node_id {
            info!("Received message from {} after {} hops", relay.from, relay.hops);
            self.stats.payloads_delivered += 1;
            return Ok(vec![Effect::Deliver(Delivery::from_relay(&relay))]);
        }

        self.forward(relay.relayed())
    }

    fn on_message(&mut self, message: TerminalMessage) -> Vec<Effect> {
        info!("Received message from {}", message.from);
        self.stats.payloads_delivered += 1;
        vec![Effect::Deliver(Delivery {
            from: message.from,
            to: Some(self.local_node_id.clone()),
            data: message.data,
            hops: None,
            message_id: None,
        })]
    }

    /// Hand `outgoing` to the next hop towards its destination. The final hop
    /// travels as a terminal `message`.
    fn forward(&mut self, outgoing: SendRouting) -> Result<Vec<Effect>, RoutingError> {
        let hop = self.lookup(&outgoing.to)?;
        let address = self
            .directory
            .address_of(&hop.node_id)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownNode(hop.node_id.clone()))?;

        debug!(
            "Forwarding payload from {} to {} via {} (cost: {}, hops: {})",
            outgoing.from, outgoing.to, hop.node_id, hop.cost, outgoing.hops
        );

        let payload = if hop.node_id == outgoing.to {
            Payload::Message(TerminalMessage {
                from: outgoing.from,
                data: outgoing.data,
            })
        } else {
            Payload::SendRouting(outgoing)
        };

        self.stats.payloads_forwarded += 1;
        Ok(vec![Effect::Send { to: address, payload }])
    }

    fn lookup(&self, destination: &NodeId) -> Result<NextHop, RoutingError> {
        if !self.directory.contains(destination) {
            return Err(RoutingError::UnknownNode(destination.clone()));
        }

        let hop = match &self.engine {
            Engine::DistanceVector { table, .. } => table.lookup(destination)?,
            Engine::LinkState { database, .. } => database.lookup(destination)?,
            Engine::Flooding(_) => return Err(RoutingError::unreachable(destination)),
        };
        Ok(hop)
    }

    fn broadcast_to<'a, I>(&self, targets: I, payload: &Payload) -> Vec<Effect>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        targets
            .into_iter()
            .filter_map(|node| match self.directory.address_of(node) {
                Some(address) => Some(Effect::Send {
                    to: address.clone(),
                    payload: payload.clone(),
                }),
                None => {
                    warn!("No address for neighbor {}, skipping", node);
                    None
                }
            })
            .collect()
    }
}

/// Origin of a weights table, named either by node id or by its address
fn weights_origin(directory: &Directory, from: &NodeId) -> Option<NodeId> {
    if directory.contains(from) {
        return Some(from.clone());
    }
    directory.node_of(&Address::new(from.as_str())).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netroute_topology::UNKNOWN_LINK_COST;
    use std::collections::VecDeque;

    fn address(node: &str) -> Address {
        Address::new(format!("{}@net", node.to_lowercase()))
    }

    fn directory(topology: Vec<(&str, Vec<&str>)>) -> Arc<Directory> {
        let names = topology
            .iter()
            .map(|(node, _)| (NodeId::from(*node), address(node)))
            .collect();
        let topology = topology
            .into_iter()
            .map(|(node, neighbors)| {
                (
                    NodeId::from(node),
                    neighbors.into_iter().map(NodeId::from).collect(),
                )
            })
            .collect();
        Arc::new(Directory::new(topology, names).unwrap())
    }

    fn ring() -> Arc<Directory> {
        directory(vec![("A", vec!["B", "C"]), ("B", vec!["A", "C"]), ("C", vec!["A", "B"])])
    }

    fn line() -> Arc<Directory> {
        directory(vec![("A", vec!["B"]), ("B", vec!["A", "C"]), ("C", vec!["B"])])
    }

    fn router(directory: &Arc<Directory>, node: &str, mode: Mode) -> Router {
        Router::new(NodeId::from(node), directory.clone(), mode, SeenMessages::unbounded()).unwrap()
    }

    /// In-memory network shuttling effects between routers
    struct Network {
        directory: Arc<Directory>,
        routers: BTreeMap<NodeId, Router>,
        in_flight: VecDeque<(Address, Address, String)>,
        deliveries: BTreeMap<NodeId, Vec<Delivery>>,
        now: Instant,
    }

    impl Network {
        fn new(directory: Arc<Directory>, mode: Mode) -> Self {
            let routers = directory
                .nodes()
                .map(|node| {
                    let router = Router::new(node.clone(), directory.clone(), mode, SeenMessages::unbounded()).unwrap();
                    (node.clone(), router)
                })
                .collect();

            Self {
                directory,
                routers,
                in_flight: VecDeque::new(),
                deliveries: BTreeMap::new(),
                now: Instant::now(),
            }
        }

        fn apply(&mut self, node: &NodeId, effects: Vec<Effect>) {
            let from = self.directory.address_of(node).unwrap().clone();
            for effect in effects {
                match effect {
                    Effect::Send { to, payload } => {
                        let raw = codec::encode(&payload).unwrap();
                        self.in_flight.push_back((from.clone(), to, raw));
                    }
                    Effect::Deliver(delivery) => {
                        self.deliveries.entry(node.clone()).or_default().push(delivery);
                    }
                }
            }
        }

        /// Every node learns that each of its neighbors is reachable
        fn connect_all(&mut self) {
            let nodes: Vec<NodeId> = self.routers.keys().cloned().collect();
            for node in nodes {
                let neighbors: Vec<Address> = self
                    .directory
                    .neighbors_of(&node)
                    .filter_map(|n| self.directory.address_of(n).cloned())
                    .collect();
                for neighbor in neighbors {
                    let now = self.now;
                    let effects = self.routers.get_mut(&node).unwrap().neighbor_reachable(&neighbor, now);
                    self.apply(&node, effects);
                }
            }
        }

        fn originate(&mut self, from: &str, to: &str, data: &str) {
            let node = NodeId::from(from);
            let effects = self
                .routers
                .get_mut(&node)
                .unwrap()
                .originate(&NodeId::from(to), data)
                .unwrap();
            self.apply(&node, effects);
        }

        /// Deliver payloads until the network is quiet; returns how many moved
        fn run(&mut self) -> usize {
            let mut steps = 0;
            while let Some((from, to, raw)) = self.in_flight.pop_front() {
                steps += 1;
                assert!(steps < 10_000, "network did not settle");

                self.now += Duration::from_millis(1);
                let node = self.directory.node_of(&to).unwrap().clone();
                let now = self.now;
                let effects = self.routers.get_mut(&node).unwrap().handle_inbound(&from, &raw, now);
                self.apply(&node, effects);
            }
            steps
        }

        fn router(&self, node: &str) -> &Router {
            &self.routers[&NodeId::from(node)]
        }

        fn delivered(&self, node: &str) -> &[Delivery] {
            self.deliveries
                .get(&NodeId::from(node))
                .map(Vec::as_slice)
                .unwrap_or(&[])
        }
    }

    fn sends(effects: &[Effect]) -> Vec<(&Address, &Payload)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send { to, payload } => Some((to, payload)),
                Effect::Deliver(_) => None,
            })
            .collect()
    }

    fn weights(from: &str, version: u64, links: &[(&str, f64)]) -> String {
        codec::encode(&Payload::Weights(WeightsUpdate {
            table: links.iter().map(|(n, c)| (NodeId::from(*n), *c)).collect(),
            version,
            from: NodeId::from(from),
        }))
        .unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("flooding".parse::<Mode>().unwrap(), Mode::Flooding);
        assert_eq!("DV".parse::<Mode>().unwrap(), Mode::DistanceVector);
        assert_eq!("link-state".parse::<Mode>().unwrap(), Mode::LinkState);
        assert!("ospf".parse::<Mode>().is_err());
        assert_eq!(Mode::DistanceVector.to_string(), "distance_vector");

        let mode: Mode = serde_json::from_str("\"lsr\"").unwrap();
        assert_eq!(mode, Mode::LinkState);
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::NoRoute.to_string(), "no route to destination");
        assert_eq!(DropReason::Malformed.to_string(), "malformed payload");
        assert_eq!(DropReason::StaleUpdate.to_string(), "stale update");
        assert_eq!(DropReason::Duplicate.to_string(), "duplicate message");
    }

    #[test]
    fn test_router_requires_local_node_in_directory() {
        let err = Router::new(NodeId::from("Z"), ring(), Mode::Flooding, SeenMessages::unbounded()).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownNode(node) if node == NodeId::from("Z")));
    }

    #[test]
    fn test_distance_vector_ring_converges() {
        let mut network = Network::new(ring(), Mode::DistanceVector);
        network.connect_all();
        network.run();

        let table = network.router("A").distance_vector().unwrap();
        let b = table.get_route(&NodeId::from("B")).unwrap();
        let c = table.get_route(&NodeId::from("C")).unwrap();
        assert_eq!((b.cost, b.next_hop.clone()), (1.0, NodeId::from("B")));
        assert_eq!((c.cost, c.next_hop.clone()), (1.0, NodeId::from("C")));

        // Another exchange round changes nothing
        let before = table.routes().clone();
        network.connect_all();
        network.run();
        assert_eq!(network.router("A").distance_vector().unwrap().routes(), &before);
    }

    #[test]
    fn test_distance_vector_relays_over_multiple_hops() {
        let mut network = Network::new(line(), Mode::DistanceVector);
        network.connect_all();
        network.run();

        let route = network
            .router("A")
            .distance_vector()
            .unwrap()
            .get_route(&NodeId::from("C"))
            .unwrap()
            .clone();
        assert_eq!((route.cost, route.next_hop), (2.0, NodeId::from("B")));

        network.originate("A", "C", "hello");
        network.run();

        let delivered = network.delivered("C");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].from, NodeId::from("A"));
        assert_eq!(delivered[0].data, "hello");
        assert!(network.delivered("B").is_empty());
        assert_eq!(network.router("B").stats().payloads_forwarded, 1);
    }

    #[test]
    fn test_relay_rewraps_with_incremented_hops() {
        let dir = directory(vec![
            ("A", vec!["B"]),
            ("B", vec!["A", "C"]),
            ("C", vec!["B", "D"]),
            ("D", vec!["C"]),
        ]);
        let mut network = Network::new(dir, Mode::DistanceVector);
        network.connect_all();
        network.run();

        let effects = network
            .routers
            .get_mut(&NodeId::from("A"))
            .unwrap()
            .originate(&NodeId::from("D"), "far")
            .unwrap();
        let sent = sends(&effects);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, &address("B"));
        match sent[0].1 {
            Payload::SendRouting(relay) => assert_eq!(relay.hops, 1),
            other => panic!("unexpected payload {:?}", other),
        }

        // B hands it on to C as send_routing with one more hop
        let raw = codec::encode(sent[0].1).unwrap();
        let now = network.now;
        let relayed = network
            .routers
            .get_mut(&NodeId::from("B"))
            .unwrap()
            .handle_inbound(&address("A"), &raw, now);
        match sends(&relayed)[0] {
            (to, Payload::SendRouting(relay)) => {
                assert_eq!(to, &address("C"));
                assert_eq!(relay.hops, 2);
            }
            other => panic!("unexpected send {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_routing_table_is_dropped() {
        let dir = ring();
        let mut a = router(&dir, "A", Mode::DistanceVector);
        let b = router(&dir, "B", Mode::DistanceVector);
        let raw = codec::encode(&Payload::RoutingTable(b.distance_vector().unwrap().advert("adv-1"))).unwrap();

        let now = Instant::now();
        assert!(!a.handle_inbound(&address("B"), &raw, now).is_empty());
        assert!(a.handle_inbound(&address("B"), &raw, now).is_empty());
        assert_eq!(a.stats().drops(DropReason::Duplicate), 1);
    }

    #[test]
    fn test_flooding_delivers_exactly_once() {
        let mut network = Network::new(ring(), Mode::Flooding);
        network.originate("A", "C", "m1");
        network.run();

        assert_eq!(network.delivered("B").len(), 1);
        assert_eq!(network.delivered("C").len(), 1);
        assert!(network.delivered("A").is_empty());
        assert_eq!(network.delivered("B")[0].data, "m1");
        assert_eq!(network.delivered("C")[0].to, Some(NodeId::from("C")));

        // B and C each relayed once and dropped the copy relayed by the other
        assert_eq!(network.router("B").stats().drops(DropReason::Duplicate), 1);
        assert_eq!(network.router("C").stats().drops(DropReason::Duplicate), 1);
    }

    #[test]
    fn test_flooded_payload_without_message_id_is_malformed() {
        let dir = ring();
        let mut b = router(&dir, "B", Mode::Flooding);
        let raw = r#"{"type":"send_routing","from":"A","to":"C","data":"x","hops":1}"#;

        assert!(b.handle_inbound(&address("A"), raw, Instant::now()).is_empty());
        assert_eq!(b.stats().drops(DropReason::Malformed), 1);
    }

    #[test]
    fn test_echo_is_answered() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::Flooding);
        let effects = b.handle_inbound(&address("A"), r#"{"type":"echo"}"#, Instant::now());

        assert_eq!(
            effects,
            vec![Effect::Send {
                to: address("A"),
                payload: Payload::EchoResponse(EchoResponse {
                    from: Some(NodeId::from("B"))
                }),
            }]
        );
    }

    #[test]
    fn test_echo_round_trip_updates_cost_and_version() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::LinkState);
        let start = Instant::now();

        let probes = b.start(start);
        assert_eq!(probes.len(), 2);
        assert!(sends(&probes).iter().all(|(_, p)| **p == Payload::Echo));

        let effects = b.handle_inbound(
            &address("A"),
            r#"{"type":"echo_response"}"#,
            start + Duration::from_millis(12),
        );

        let db = b.link_state().unwrap();
        assert_eq!(db.local_table().version, 1);
        assert_eq!(db.local_table().table.get("A"), Some(&12.0));
        assert_eq!(db.local_table().table.get("C"), Some(&UNKNOWN_LINK_COST));

        // Broadcast to both neighbors
        let sent = sends(&effects);
        assert_eq!(sent.len(), 2);
        for (_, payload) in sent {
            match payload {
                Payload::Weights(update) => {
                    assert_eq!(update.version, 1);
                    assert_eq!(update.from, NodeId::from("B"));
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
    }

    #[test]
    fn test_unsolicited_echo_response_is_unknown_peer() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::LinkState);

        let effects = b.handle_inbound(&address("A"), r#"{"type":"echo_response","from":"A"}"#, Instant::now());
        assert!(effects.is_empty());
        assert_eq!(b.link_state().unwrap().local_table().version, 0);
        assert_eq!(b.stats().drops(DropReason::UnknownPeer), 1);
    }

    #[test]
    fn test_stale_weights_do_not_rebroadcast() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::LinkState);
        let now = Instant::now();

        let accepted = b.handle_inbound(&address("A"), &weights("A", 3, &[("B", 1.0)]), now);
        assert_eq!(sends(&accepted).len(), 2);

        let tables_before = b.link_state().unwrap().tables().clone();
        assert!(b.handle_inbound(&address("C"), &weights("A", 3, &[("B", 9.0)]), now).is_empty());
        assert!(b.handle_inbound(&address("C"), &weights("A", 1, &[]), now).is_empty());
        assert_eq!(b.link_state().unwrap().tables(), &tables_before);
        assert_eq!(b.stats().drops(DropReason::StaleUpdate), 2);
    }

    #[test]
    fn test_weights_naming_origin_by_address_are_accepted() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::LinkState);

        let raw = r#"{"type":"weights","table":{"B":3.0},"version":1,"from":"a@net"}"#;
        let effects = b.handle_inbound(&address("A"), raw, Instant::now());

        // Re-flooded unchanged to both neighbors
        let flooded = sends(&effects);
        assert_eq!(flooded.len(), 2);
        assert!(flooded.iter().all(|(_, payload)| matches!(
            payload,
            Payload::Weights(update) if update.from == NodeId::from("a@net")
        )));

        let db = b.link_state().unwrap();
        assert_eq!(db.tables().len(), 2);
        assert_eq!(db.tables()[&NodeId::from("A")].version, 1);
        assert_eq!(b.stats().drops(DropReason::UnknownPeer), 0);

        // The same version under the node id is stale
        assert!(b.handle_inbound(&address("C"), &weights("A", 1, &[("B", 3.0)]), Instant::now()).is_empty());
        assert_eq!(b.stats().drops(DropReason::StaleUpdate), 1);
    }

    #[test]
    fn test_weights_from_unknown_address_are_dropped() {
        let dir = line();
        let mut b = router(&dir, "B", Mode::LinkState);

        let effects = b.handle_inbound(&Address::from("mallory@net"), &weights("A", 1, &[]), Instant::now());
        assert!(effects.is_empty());
        assert_eq!(b.link_state().unwrap().tables().len(), 1);
        assert_eq!(b.stats().drops(DropReason::UnknownPeer), 1);
    }

    #[test]
    fn test_malformed_and_unknown_payloads_are_dropped() {
        let dir = ring();
        let mut a = router(&dir, "A", Mode::DistanceVector);
        let now = Instant::now();

        assert!(a.handle_inbound(&address("B"), "{not json", now).is_empty());
        assert!(a.handle_inbound(&address("B"), r#"{"type":"weights","version":1}"#, now).is_empty());
        assert!(a.handle_inbound(&address("B"), r#"{"type":"teleport"}"#, now).is_empty());

        let stats = a.stats();
        assert_eq!(stats.payloads_dropped, 3);
        assert_eq!(stats.drops(DropReason::Malformed), 2);
        assert_eq!(stats.drops(DropReason::Unrecognized), 1);
    }

    #[test]
    fn test_originate_surfaces_routing_failures() {
        let dir = line();
        let mut a = router(&dir, "A", Mode::DistanceVector);

        let err = a.originate(&NodeId::from("C"), "hi").unwrap_err();
        assert!(matches!(err, RoutingError::Unreachable(_)));
        assert_eq!(a.decide(&NodeId::from("C")), RoutingDecision::Drop(DropReason::NoRoute));

        let err = a.originate(&NodeId::from("Q"), "hi").unwrap_err();
        assert!(matches!(err, RoutingError::UnknownNode(_)));
    }

    #[test]
    fn test_originate_to_self_delivers_locally() {
        let dir = line();
        let mut a = router(&dir, "A", Mode::LinkState);

        let effects = a.originate(&NodeId::from("A"), "note").unwrap();
        assert!(matches!(&effects[..], [Effect::Deliver(d)] if d.data == "note"));
        assert_eq!(a.decide(&NodeId::from("A")), RoutingDecision::Local);
    }

    #[test]
    fn test_link_state_network_routes_over_measured_paths() {
        let mut network = Network::new(line(), Mode::LinkState);
        network.connect_all();
        network.run();

        let a = network.router("A").link_state().unwrap();
        assert_eq!(a.tables().len(), 3);
        assert_eq!(a.next_hop(&NodeId::from("C")).unwrap(), NodeId::from("B"));
        assert!(a.local_table().table[&NodeId::from("B")] < UNKNOWN_LINK_COST);

        network.originate("A", "C", "over the link-state path");
        network.run();

        let delivered = network.delivered("C");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, "over the link-state path");
    }

    #[test]
    fn test_neighbor_reachable_shares_state() {
        let dir = line();
        let now = Instant::now();

        let mut dv = router(&dir, "B", Mode::DistanceVector);
        let effects = dv.neighbor_reachable(&address("A"), now);
        assert!(matches!(&effects[..], [Effect::Send { payload: Payload::RoutingTable(_), .. }]));
        assert!(dv.reachable().contains("A"));

        let mut ls = router(&dir, "B", Mode::LinkState);
        let effects = ls.neighbor_reachable(&address("A"), now);
        let kinds: Vec<&str> = sends(&effects).into_iter().map(|(_, p)| p.kind()).collect();
        assert_eq!(kinds, vec!["weights", "echo"]);

        let mut flooding = router(&dir, "B", Mode::Flooding);
        assert!(flooding.neighbor_reachable(&address("A"), now).is_empty());
        assert!(flooding.neighbor_reachable(&Address::from("nobody@net"), now).is_empty());
    }

    #[test]
    fn test_reachable_non_neighbor_is_ignored() {
        let dir = line();
        let now = Instant::now();

        // C is in the directory but not a neighbor of A
        let mut ls = router(&dir, "A", Mode::LinkState);
        assert!(ls.neighbor_reachable(&address("C"), now).is_empty());
        assert!(ls.reachable().is_empty());

        // An answer from C finds no outstanding probe
        ls.handle_inbound(&address("C"), r#"{"type":"echo_response"}"#, now + Duration::from_millis(3));
        let local = ls.link_state().unwrap().local_table();
        assert_eq!(local.version, 0);
        assert!(!local.table.contains_key("C"));
        assert_eq!(ls.stats().drops(DropReason::UnknownPeer), 1);

        let mut dv = router(&dir, "A", Mode::DistanceVector);
        assert!(dv.neighbor_reachable(&address("C"), now).is_empty());
        assert!(dv.reachable().is_empty());
    }

    #[test]
    fn test_expired_probe_marks_link_unknown() {
        let dir = line();
        let mut a = router(&dir, "A", Mode::LinkState);
        let start = Instant::now();

        a.start(start);
        a.handle_inbound(&address("B"), r#"{"type":"echo_response"}"#, start + Duration::from_millis(5));
        assert_eq!(a.link_state().unwrap().local_table().version, 1);

        // Next probe goes unanswered
        a.probe_neighbors(start + Duration::from_secs(1));
        let effects = a.expire_probes(start + Duration::from_secs(10), Duration::from_secs(5));

        let db = a.link_state().unwrap();
        assert_eq!(db.local_table().version, 2);
        assert_eq!(db.local_table().table.get("B"), Some(&UNKNOWN_LINK_COST));
        assert!(matches!(&effects[..], [Effect::Send { payload: Payload::Weights(w), .. }] if w.version == 2));

        // Nothing left to expire
        assert!(a.expire_probes(start + Duration::from_secs(20), Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_expired_probe_on_unknown_link_only_logs() {
        let dir = line();
        let mut a = router(&dir, "A", Mode::LinkState);
        let start = Instant::now();

        a.start(start);
        assert!(a.expire_probes(start + Duration::from_secs(10), Duration::from_secs(5)).is_empty());
        assert_eq!(a.link_state().unwrap().local_table().version, 0);
    }
}
