//! Flooding with duplicate suppression

use crate::seen::SeenMessages;
use netroute_wire::NodeId;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Outcome of offering a flooded message id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodDecision {
    /// First sighting: observe it and forward to these neighbors
    Forward {
        /// Neighbors to relay to, the sender excluded
        targets: Vec<NodeId>,
    },
    /// Already processed, drop silently
    Duplicate,
}

/// Flooding engine over the static neighbor set
#[derive(Debug, Clone)]
pub struct FloodingEngine {
    local_node_id: NodeId,
    neighbors: BTreeSet<NodeId>,
    seen: SeenMessages,
}

impl FloodingEngine {
    /// Create a new flooding engine
    pub fn new<I>(local_node_id: NodeId, neighbors: I, seen: SeenMessages) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        Self {
            local_node_id,
            neighbors: neighbors.into_iter().collect(),
            seen,
        }
    }

    /// Allocate an id for a locally originated message and mark it seen.
    ///
    /// Returns the id and every neighbor to send to.
    pub fn originate(&mut self) -> (String, Vec<NodeId>) {
        let message_id = Uuid::new_v4().to_string();
        self.seen.insert(&message_id);
        (message_id, self.neighbors.iter().cloned().collect())
    }

    /// Offer a received message id. `sender` is the neighbor it arrived from,
    /// when known.
    pub fn receive(&mut self, message_id: &str, sender: Option<&NodeId>) -> FloodDecision {
        if !self.seen.insert(message_id) {
            debug!("Node {} already flooded message {}", self.local_node_id, message_id);
            return FloodDecision::Duplicate;
        }

        let targets = self
            .neighbors
            .iter()
            .filter(|neighbor| Some(*neighbor) != sender)
            .cloned()
            .collect();

        FloodDecision::Forward { targets }
    }

    /// Processed message ids
    pub fn seen(&self) -> &SeenMessages {
        &self.seen
    }
}
