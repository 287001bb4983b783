//! Next hop definitions and lookup

use netroute_topology::{LinkStateDatabase, UnreachableDestination};
use netroute_wire::NodeId;
use serde::{Deserialize, Serialize};

/// A next hop for routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextHop {
    /// Neighbor to hand the payload to
    pub node_id: NodeId,
    /// Total cost to the destination through this neighbor
    pub cost: f64,
}

impl NextHop {
    /// Create a new next hop
    pub fn new(node_id: NodeId, cost: f64) -> Self {
        Self { node_id, cost }
    }
}

/// Anything that can pick a neighbor for a destination
pub trait RouteLookup {
    /// Resolve the next hop towards `destination`
    fn lookup(&self, destination: &NodeId) -> Result<NextHop, UnreachableDestination>;

    /// Check if a destination is reachable
    fn is_reachable(&self, destination: &NodeId) -> bool {
        self.lookup(destination).is_ok()
    }
}

impl RouteLookup for LinkStateDatabase {
    fn lookup(&self, destination: &NodeId) -> Result<NextHop, UnreachableDestination> {
        let node_id = self.next_hop(destination)?;
        let cost = self
            .paths()
            .distance_to(destination)
            .ok_or_else(|| UnreachableDestination {
                destination: destination.clone(),
            })?;
        Ok(NextHop::new(node_id, cost))
    }
}
