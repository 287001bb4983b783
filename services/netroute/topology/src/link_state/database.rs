//! LinkStateDatabase implementation methods.

use super::{
    shortest_paths, LinkStateDatabase, ShortestPaths, UpdateOutcome, WeightTable,
    UNKNOWN_LINK_COST,
};
use crate::error::UnreachableDestination;
use netroute_wire::{NodeId, WeightsUpdate};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl LinkStateDatabase {
    /// Create a database whose own table lists every neighbor at
    /// [`UNKNOWN_LINK_COST`], version 0
    pub fn new<I>(local_node_id: NodeId, neighbors: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let local = WeightTable {
            table: neighbors
                .into_iter()
                .map(|neighbor| (neighbor, UNKNOWN_LINK_COST))
                .collect(),
            version: 0,
        };

        let mut tables = BTreeMap::new();
        tables.insert(local_node_id.clone(), local);

        let mut db = Self {
            paths: ShortestPaths::empty(local_node_id.clone()),
            local_node_id,
            tables,
        };
        db.compute_routes();
        db
    }

    /// Local node ID
    pub fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Our own weight table
    pub fn local_table(&self) -> &WeightTable {
        // Inserted in `new` and never removed
        &self.tables[&self.local_node_id]
    }

    /// Record a measured cost for a local link.
    ///
    /// Advances the local version by exactly one, recomputes paths and returns
    /// the advertisement to flood.
    pub fn record_link_cost(&mut self, neighbor: NodeId, cost: f64) -> WeightsUpdate {
        let local = self.local_table_mut();
        local.table.insert(neighbor.clone(), cost);
        local.version += 1;
        let version = local.version;

        debug!("Link {} -> {} now costs {:.3} (version {})", self.local_node_id, neighbor, cost, version);

        self.compute_routes();
        self.local_advert()
    }

    /// Fall back to [`UNKNOWN_LINK_COST`] for a local link whose probe went
    /// unanswered. Returns `None` when the link was already unknown.
    pub fn mark_link_unknown(&mut self, neighbor: &NodeId) -> Option<WeightsUpdate> {
        let current = self.local_table().table.get(neighbor).copied();
        if current == Some(UNKNOWN_LINK_COST) {
            return None;
        }

        info!("Link {} -> {} lost its measured cost", self.local_node_id, neighbor);
        Some(self.record_link_cost(neighbor.clone(), UNKNOWN_LINK_COST))
    }

    /// Offer a received weight table.
    ///
    /// A table is stored only for an unknown origin or a strictly newer
    /// version. Our own origin is never overwritten from the network.
    pub fn process_weights(&mut self, update: WeightsUpdate) -> UpdateOutcome {
        if update.from == self.local_node_id {
            debug!("Ignoring echo of our own weight table (version {})", update.version);
            return UpdateOutcome::Stale;
        }

        if let Some(existing) = self.tables.get(&update.from) {
            if update.version <= existing.version {
                debug!(
                    "Ignoring stale weights from {} (version {} vs {})",
                    update.from, update.version, existing.version
                );
                return UpdateOutcome::Stale;
            }
        }

        info!(
            "Accepted weights from {} (version {}, {} links)",
            update.from,
            update.version,
            update.table.len()
        );

        self.tables.insert(
            update.from,
            WeightTable {
                table: update.table,
                version: update.version,
            },
        );

        self.compute_routes();
        UpdateOutcome::Accepted
    }

    /// Recompute shortest paths from scratch over every stored table
    fn compute_routes(&mut self) {
        self.paths = shortest_paths(
            self.tables.iter().map(|(origin, weights)| (origin, &weights.table)),
            &self.local_node_id,
        );

        debug!(
            "Computed paths to {} nodes from {}",
            self.paths.distances.len().saturating_sub(1),
            self.local_node_id
        );
    }

    /// Advertisement for a stored origin
    pub fn advert_for(&self, origin: &NodeId) -> Option<WeightsUpdate> {
        self.tables.get(origin).map(|weights| WeightsUpdate {
            table: weights.table.clone(),
            version: weights.version,
            from: origin.clone(),
        })
    }

    /// Advertisement of our own table
    pub fn local_advert(&self) -> WeightsUpdate {
        WeightsUpdate {
            table: self.local_table().table.clone(),
            version: self.local_table().version,
            from: self.local_node_id.clone(),
        }
    }

    /// Advertisements for every stored origin (for synchronizing new neighbors)
    pub fn all_adverts(&self) -> Vec<WeightsUpdate> {
        self.tables
            .keys()
            .filter_map(|origin| self.advert_for(origin))
            .collect()
    }

    /// Current shortest paths rooted at the local node
    pub fn paths(&self) -> &ShortestPaths {
        &self.paths
    }

    /// Neighbor to forward to for `destination`
    pub fn next_hop(&self, destination: &NodeId) -> Result<NodeId, UnreachableDestination> {
        self.paths.next_hop(destination)
    }

    /// Stored tables by origin
    pub fn tables(&self) -> &BTreeMap<NodeId, WeightTable> {
        &self.tables
    }

    /// Get link-state statistics
    pub fn get_stats(&self) -> LinkStateStats {
        LinkStateStats {
            known_origins: self.tables.len(),
            reachable_nodes: self.paths.distances.len().saturating_sub(1),
            local_version: self.local_table().version,
        }
    }

    fn local_table_mut(&mut self) -> &mut WeightTable {
        self.tables.entry(self.local_node_id.clone()).or_default()
    }
}

/// Link-state database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateStats {
    /// Number of origins with a stored table (ourselves included)
    pub known_origins: usize,
    /// Number of nodes with a known path
    pub reachable_nodes: usize,
    /// Current local table version
    pub local_version: u64,
}
