//! Link-state topology database and shortest path computation.

use netroute_wire::NodeId;
use std::collections::BTreeMap;

/// Cost assigned to a neighbor link that has not been measured (or whose probe expired)
pub const UNKNOWN_LINK_COST: f64 = 10_000.0;

/// One origin's view of its own links
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightTable {
    /// Neighbor -> link cost as measured by the origin
    pub table: BTreeMap<NodeId, f64>,
    /// Origin's table version
    pub version: u64,
}

/// Result of offering a weight table to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Stored; paths were recomputed and the table should be re-flooded
    Accepted,
    /// Version not newer than the stored one; nothing changed
    Stale,
}

/// Link-state topology database
#[derive(Debug)]
pub struct LinkStateDatabase {
    /// Local node ID
    local_node_id: NodeId,
    /// Latest weight table per origin, including our own
    tables: BTreeMap<NodeId, WeightTable>,
    /// Shortest paths rooted at the local node
    paths: ShortestPaths,
}

// Include implementation
mod database;
mod dijkstra;
pub use database::LinkStateStats;
pub use dijkstra::{shortest_paths, ShortestPaths};
