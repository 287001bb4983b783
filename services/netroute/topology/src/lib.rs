//! Static topology directory, versioned link-state database and Dijkstra paths for netroute.
//!
//! This crate provides the node directory (identifiers, addresses, adjacency)
//! that every routing mode consults, and the link-state database that keeps one
//! versioned weight table per origin and derives shortest paths from them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod error;
pub mod link_state;

pub use directory::Directory;
pub use error::{TopologyError, UnreachableDestination};
pub use link_state::*;
