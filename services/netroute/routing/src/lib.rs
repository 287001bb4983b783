//! Routing engines and message dispatch for netroute.
//!
//! This crate provides the three routing modes a node can run (flooding,
//! distance-vector and link-state), the echo-based link prober feeding the
//! link-state engine, and the [`Router`] that classifies every inbound payload
//! and turns it into effects for the transport.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flooding;
pub mod next_hop;
pub mod prober;
pub mod router;
pub mod seen;
pub mod table;

pub use error::*;
pub use flooding::*;
pub use next_hop::*;
pub use prober::*;
pub use router::*;
pub use seen::*;
pub use table::*;
