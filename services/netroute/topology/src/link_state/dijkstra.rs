//! Single-source Dijkstra over per-origin weight tables.

use crate::error::UnreachableDestination;
use netroute_wire::NodeId;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::warn;

/// Shortest distances and predecessors rooted at one source
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPaths {
    /// Root of the computation
    pub source: NodeId,
    /// Reachable node -> total cost from the source
    pub distances: BTreeMap<NodeId, f64>,
    /// Reachable node -> previous node on its shortest path
    pub predecessors: BTreeMap<NodeId, NodeId>,
}

/// Heap key ordered by cost, then by node id for deterministic ties
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    cost: f64,
    node: NodeId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute shortest paths from `source`.
///
/// `graph` maps each origin to the link costs it reported, so edges are
/// directed and `A -> B` may differ from `B -> A`. Negative or non-finite
/// costs are skipped.
pub fn shortest_paths<'a, I>(graph: I, source: &NodeId) -> ShortestPaths
where
    I: IntoIterator<Item = (&'a NodeId, &'a BTreeMap<NodeId, f64>)>,
{
    let edges: BTreeMap<&NodeId, &BTreeMap<NodeId, f64>> = graph.into_iter().collect();

    let mut distances: BTreeMap<NodeId, f64> = BTreeMap::new();
    let mut predecessors: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut settled: BTreeSet<NodeId> = BTreeSet::new();
    let mut frontier = BinaryHeap::new();

    distances.insert(source.clone(), 0.0);
    frontier.push(Reverse(Candidate {
        cost: 0.0,
        node: source.clone(),
    }));

    while let Some(Reverse(Candidate { cost, node })) = frontier.pop() {
        if !settled.insert(node.clone()) {
            continue;
        }

        let Some(links) = edges.get(&node) else {
            continue;
        };

        for (neighbor, &link_cost) in links.iter() {
            if !link_cost.is_finite() || link_cost < 0.0 {
                warn!("Skipping link {} -> {} with invalid cost {}", node, neighbor, link_cost);
                continue;
            }

            let candidate = cost + link_cost;
            let improves = distances
                .get(neighbor)
                .map(|&known| candidate < known)
                .unwrap_or(true);

            if improves {
                distances.insert(neighbor.clone(), candidate);
                predecessors.insert(neighbor.clone(), node.clone());
                frontier.push(Reverse(Candidate {
                    cost: candidate,
                    node: neighbor.clone(),
                }));
            }
        }
    }

    ShortestPaths {
        source: source.clone(),
        distances,
        predecessors,
    }
}

impl ShortestPaths {
    /// Paths knowing nothing beyond the source
    pub fn empty(source: NodeId) -> Self {
        Self {
            source,
            distances: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    /// Total cost to a destination, if reachable
    pub fn distance_to(&self, destination: &NodeId) -> Option<f64> {
        self.distances.get(destination).copied()
    }

    /// Neighbor of the source on the shortest path to `destination`.
    ///
    /// Walks predecessors back from the destination until the node whose
    /// predecessor is the source. The source itself resolves to itself.
    pub fn next_hop(&self, destination: &NodeId) -> Result<NodeId, UnreachableDestination> {
        if *destination == self.source {
            return Ok(destination.clone());
        }

        let unreachable = || UnreachableDestination {
            destination: destination.clone(),
        };

        let mut visited = BTreeSet::new();
        let mut current = destination;
        visited.insert(current.clone());

        loop {
            let previous = self.predecessors.get(current).ok_or_else(unreachable)?;
            if *previous == self.source {
                return Ok(current.clone());
            }
            if !visited.insert(previous.clone()) {
                warn!(
                    "Predecessor chain towards {} revisits {}, treating as unreachable",
                    destination, previous
                );
                return Err(unreachable());
            }
            current = previous;
        }
    }

    /// Full path from the source to `destination`, both ends included
    pub fn path_to(&self, destination: &NodeId) -> Result<Vec<NodeId>, UnreachableDestination> {
        // Validates the chain (and guards against cycles) before collecting it
        self.next_hop(destination)?;

        let mut path = vec![destination.clone()];
        let mut current = destination;
        while *current != self.source {
            match self.predecessors.get(current) {
                Some(previous) => {
                    path.push(previous.clone());
                    current = previous;
                }
                None => break,
            }
        }
        path.reverse();
        Ok(path)
    }
}
