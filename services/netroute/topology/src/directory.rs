//! Static mapping of node identifiers to addresses and direct neighbors.

use crate::error::TopologyError;
use netroute_wire::{Address, NodeId};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// Tagged configuration document, e.g. `{"type": "topo", "config": {...}}`
#[derive(Debug, Deserialize)]
struct Document<T> {
    #[serde(rename = "type")]
    kind: String,
    config: T,
}

/// Immutable network directory: topology plus bidirectional address lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Node -> directly adjacent nodes
    topology: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Node -> transport address
    addresses: BTreeMap<NodeId, Address>,
    /// Transport address -> node
    nodes_by_address: HashMap<Address, NodeId>,
}

impl Directory {
    /// Build and validate a directory.
    ///
    /// Every node named by either map, including every listed neighbor, must
    /// have both a topology entry and an address, and addresses must be unique.
    pub fn new(
        topology: BTreeMap<NodeId, Vec<NodeId>>,
        names: BTreeMap<NodeId, Address>,
    ) -> Result<Self, TopologyError> {
        let topology: BTreeMap<NodeId, BTreeSet<NodeId>> = topology
            .into_iter()
            .map(|(node, neighbors)| (node, neighbors.into_iter().collect()))
            .collect();

        for node in names.keys() {
            if !topology.contains_key(node) {
                return Err(TopologyError::MissingFromTopology(node.clone()));
            }
        }

        for (node, neighbors) in &topology {
            if !names.contains_key(node) {
                return Err(TopologyError::MissingAddress(node.clone()));
            }
            for neighbor in neighbors {
                if !topology.contains_key(neighbor) {
                    return Err(TopologyError::MissingFromTopology(neighbor.clone()));
                }
            }
        }

        let mut nodes_by_address = HashMap::with_capacity(names.len());
        for (node, address) in &names {
            if let Some(first) = nodes_by_address.insert(address.clone(), node.clone()) {
                return Err(TopologyError::DuplicateAddress {
                    address: address.clone(),
                    first,
                    second: node.clone(),
                });
            }
        }

        debug!("Loaded directory with {} nodes", names.len());

        Ok(Self {
            topology,
            addresses: names,
            nodes_by_address,
        })
    }

    /// Build a directory from the two lab documents:
    /// `{"type": "topo", "config": {"A": ["B"]}}` and
    /// `{"type": "names", "config": {"A": "a@host"}}`.
    ///
    /// Single-quoted documents are accepted.
    pub fn from_documents(topo: &str, names: &str) -> Result<Self, TopologyError> {
        let topology = parse_document::<BTreeMap<NodeId, Vec<NodeId>>>(topo, "topo")?;
        let names = parse_document::<BTreeMap<NodeId, Address>>(names, "names")?;
        Self::new(topology, names)
    }

    /// Direct neighbors of a node (empty for unknown nodes)
    pub fn neighbors_of<'a>(&'a self, node: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.topology.get(node).into_iter().flatten()
    }

    /// Whether `candidate` is listed as a direct neighbor of `node`
    pub fn is_neighbor(&self, node: &NodeId, candidate: &NodeId) -> bool {
        self.topology
            .get(node)
            .map(|neighbors| neighbors.contains(candidate))
            .unwrap_or(false)
    }

    /// Transport address of a node
    pub fn address_of(&self, node: &NodeId) -> Option<&Address> {
        self.addresses.get(node)
    }

    /// Node owning a transport address
    pub fn node_of(&self, address: &Address) -> Option<&NodeId> {
        self.nodes_by_address.get(address)
    }

    /// Whether the node is part of the network
    pub fn contains(&self, node: &NodeId) -> bool {
        self.topology.contains_key(node)
    }

    /// All nodes in identifier order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.topology.keys()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.topology.len()
    }

    /// Whether the directory has no nodes
    pub fn is_empty(&self) -> bool {
        self.topology.is_empty()
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topology:")?;
        for (node, neighbors) in &self.topology {
            let listed: Vec<&str> = neighbors.iter().map(NodeId::as_str).collect();
            writeln!(f, "{} -> {}", node, listed.join(", "))?;
        }
        writeln!(f)?;
        writeln!(f, "Node Names:")?;
        for (node, address) in &self.addresses {
            writeln!(f, "{}: {}", node, address)?;
        }
        Ok(())
    }
}

fn parse_document<T>(content: &str, expected: &'static str) -> Result<T, TopologyError>
where
    T: for<'de> Deserialize<'de>,
{
    let normalized = content.replace('\'', "\"");
    let document: Document<T> =
        serde_json::from_str(&normalized).map_err(|e| TopologyError::InvalidDocument {
            expected,
            reason: e.to_string(),
        })?;

    if document.kind != expected {
        return Err(TopologyError::InvalidDocument {
            expected,
            reason: format!("unexpected type '{}'", document.kind),
        });
    }

    Ok(document.config)
}
