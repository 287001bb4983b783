//! Distance-vector routing table

use crate::next_hop::{NextHop, RouteLookup};
use netroute_topology::UnreachableDestination;
use netroute_wire::{NodeId, RouteAdvert, RoutingTableData, RoutingTableUpdate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Cost added for every hop a distance-vector route traverses
pub const HOP_COST: f64 = 1.0;

/// Best known route to one destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// Total cost to the destination
    pub cost: f64,
    /// Neighbor to forward through
    pub next_hop: NodeId,
}

/// Distance-vector table: destination -> (cost, next hop).
///
/// Always contains the local node at cost 0 routed through itself. Entries
/// only ever get cheaper.
#[derive(Debug, Clone)]
pub struct DistanceVectorTable {
    local_node_id: NodeId,
    routes: BTreeMap<NodeId, RoutingEntry>,
}

impl DistanceVectorTable {
    /// Create a table holding only the route to ourselves
    pub fn new(local_node_id: NodeId) -> Self {
        let mut routes = BTreeMap::new();
        routes.insert(
            local_node_id.clone(),
            RoutingEntry {
                cost: 0.0,
                next_hop: local_node_id.clone(),
            },
        );

        Self {
            local_node_id,
            routes,
        }
    }

    /// Local node ID
    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Merge a neighbor's advertised table.
    ///
    /// Every advertised destination is offered at the advertised cost plus
    /// [`HOP_COST`] through `peer`, and replaces our entry only when strictly
    /// cheaper. Returns `true` if anything changed.
    pub fn merge(&mut self, peer: &NodeId, advertised: &BTreeMap<NodeId, RouteAdvert>) -> bool {
        let mut dirty = false;

        for (destination, (cost, _)) in advertised {
            if !cost.is_finite() || *cost < 0.0 {
                warn!(
                    "Ignoring route to {} from {} with invalid cost {}",
                    destination, peer, cost
                );
                continue;
            }

            let candidate = cost + HOP_COST;
            let improves = self
                .routes
                .get(destination)
                .map(|entry| candidate < entry.cost)
                .unwrap_or(true);

            if improves {
                debug!(
                    "Route to {} now via {} (cost: {})",
                    destination, peer, candidate
                );
                self.routes.insert(
                    destination.clone(),
                    RoutingEntry {
                        cost: candidate,
                        next_hop: peer.clone(),
                    },
                );
                dirty = true;
            }
        }

        dirty
    }

    /// Get the route to a destination
    pub fn get_route(&self, destination: &NodeId) -> Option<&RoutingEntry> {
        self.routes.get(destination)
    }

    /// All routes, ourselves included
    pub fn routes(&self) -> &BTreeMap<NodeId, RoutingEntry> {
        &self.routes
    }

    /// Number of known destinations, ourselves included
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Never true, the local route is always present
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Full-table advertisement under the given message id
    pub fn advert(&self, message_id: impl Into<String>) -> RoutingTableUpdate {
        RoutingTableUpdate {
            from: self.local_node_id.clone(),
            message_id: message_id.into(),
            data: RoutingTableData {
                table_routes: self
                    .routes
                    .iter()
                    .map(|(destination, entry)| {
                        (destination.clone(), (entry.cost, entry.next_hop.clone()))
                    })
                    .collect(),
            },
        }
    }
}

impl RouteLookup for DistanceVectorTable {
    fn lookup(&self, destination: &NodeId) -> Result<NextHop, UnreachableDestination> {
        self.routes
            .get(destination)
            .map(|entry| NextHop::new(entry.next_hop.clone(), entry.cost))
            .ok_or_else(|| UnreachableDestination {
                destination: destination.clone(),
            })
    }
}
