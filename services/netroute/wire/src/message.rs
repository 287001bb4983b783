//! Routing payloads exchanged between nodes.
//!
//! Every payload travels as a JSON object carrying a `type` discriminator.
//! `send_routing` is shared by two shapes: a destination-addressed relay
//! (`to` present) and a distance-vector table advertisement (`data.tableRoutes`).

use crate::node::NodeId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// `type` tag of an echo probe
pub const ECHO: &str = "echo";
/// `type` tag of an echo reply
pub const ECHO_RESPONSE: &str = "echo_response";
/// `type` tag of a link-state weight table
pub const WEIGHTS: &str = "weights";
/// `type` tag of relayed payloads and distance-vector advertisements
pub const SEND_ROUTING: &str = "send_routing";
/// `type` tag of a terminal delivery
pub const MESSAGE: &str = "message";

/// Distance-vector advertisement for one destination: `(cost, next_hop)`
pub type RouteAdvert = (f64, NodeId);

/// Closed set of payloads understood by a node
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Latency probe, carries nothing
    Echo,
    /// Reply to a latency probe
    EchoResponse(EchoResponse),
    /// Versioned link-state weight table of one origin
    Weights(WeightsUpdate),
    /// Full distance-vector table of a neighbor
    RoutingTable(RoutingTableUpdate),
    /// Destination-addressed payload in transit
    SendRouting(SendRouting),
    /// Payload on its final hop
    Message(TerminalMessage),
    /// Well-formed object with a `type` this node does not know
    Unrecognized {
        /// The unknown `type` value
        kind: String,
    },
}

impl Payload {
    /// Wire discriminator of this payload
    pub fn kind(&self) -> &str {
        match self {
            Payload::Echo => ECHO,
            Payload::EchoResponse(_) => ECHO_RESPONSE,
            Payload::Weights(_) => WEIGHTS,
            Payload::RoutingTable(_) | Payload::SendRouting(_) => SEND_ROUTING,
            Payload::Message(_) => MESSAGE,
            Payload::Unrecognized { kind } => kind,
        }
    }
}

/// Reply to an echo probe
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EchoResponse {
    /// Responding node, when it chooses to identify itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NodeId>,
}

/// Link-state weight table flooded through the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsUpdate {
    /// Link costs as measured by the origin, keyed by neighbor
    pub table: BTreeMap<NodeId, f64>,
    /// Origin's table version
    pub version: u64,
    /// Node that measured this table. Older peers send its address here
    /// instead of its id.
    pub from: NodeId,
}

/// Distance-vector table advertisement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTableUpdate {
    /// Advertising neighbor
    pub from: NodeId,
    /// Unique id for duplicate suppression
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Advertised routes
    pub data: RoutingTableData,
}

/// Body of a distance-vector advertisement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutingTableData {
    /// Destination -> (cost, next hop) as seen by the advertiser
    #[serde(rename = "tableRoutes")]
    pub table_routes: BTreeMap<NodeId, RouteAdvert>,
}

/// Destination-addressed payload relayed hop by hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRouting {
    /// Original sender
    pub from: NodeId,
    /// Final destination
    pub to: NodeId,
    /// Application data
    pub data: String,
    /// Relays traversed so far
    #[serde(deserialize_with = "deserialize_hops")]
    pub hops: u32,
    /// Flood id, set only in flooding mode
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl SendRouting {
    /// Create a payload leaving its sender (one hop on the wire)
    pub fn new(from: NodeId, to: NodeId, data: impl Into<String>) -> Self {
        Self {
            from,
            to,
            data: data.into(),
            hops: 1,
            message_id: None,
        }
    }

    /// Tag the payload with a flood id
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Copy of this payload for the next relay
    pub fn relayed(&self) -> Self {
        Self {
            hops: self.hops.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Payload delivered to its destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalMessage {
    /// Original sender
    pub from: NodeId,
    /// Application data
    pub data: String,
}

/// Accepts `hops` as a number or as a numeric string
fn deserialize_hops<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Hops {
        Number(u32),
        Text(String),
    }

    match Hops::deserialize(deserializer)? {
        Hops::Number(hops) => Ok(hops),
        Hops::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relayed_increments_hops_only() {
        let original = SendRouting::new(NodeId::from("A"), NodeId::from("C"), "hola")
            .with_message_id("m1");
        let relayed = original.relayed();

        assert_eq!(original.hops, 1);
        assert_eq!(relayed.hops, 2);
        assert_eq!(relayed.from, original.from);
        assert_eq!(relayed.to, original.to);
        assert_eq!(relayed.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_payload_kind() {
        assert_eq!(Payload::Echo.kind(), "echo");
        assert_eq!(
            Payload::Unrecognized { kind: "presence".to_string() }.kind(),
            "presence"
        );
    }
}
