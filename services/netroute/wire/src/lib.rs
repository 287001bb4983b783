//! Node identifiers, typed routing payloads and their JSON encoding for netroute.
//!
//! Nodes exchange single-line JSON objects over a text transport. Each object
//! carries a `type` discriminator that maps onto a closed [`Payload`] enum:
//!
//! ```text
//! +---------------+----------------------------+---------------------+
//! | type          | fields                     | direction           |
//! +---------------+----------------------------+---------------------+
//! | echo          | -                          | probe -> neighbor   |
//! | echo_response | from?                      | reply -> prober     |
//! | weights       | table, version, from       | flooded             |
//! | send_routing  | from, to, data, hops       | hop-by-hop relay    |
//! | send_routing  | from, messageId, data      | distance-vector adv |
//! | message       | from, data                 | terminal delivery   |
//! +---------------+----------------------------+---------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod message;
pub mod node;

pub use codec::{decode, encode};
pub use error::WireError;
pub use message::{
    EchoResponse, Payload, RouteAdvert, RoutingTableData, RoutingTableUpdate, SendRouting,
    TerminalMessage, WeightsUpdate,
};
pub use node::{Address, NodeId};
