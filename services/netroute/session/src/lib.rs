//! Transports and the per-node actor loop for netroute.
//!
//! This crate connects a [`netroute_routing::Router`] to the outside world.
//!
//! ## Features
//!
//! - **Transport trait**: best-effort text delivery plus neighbor-reachable events
//! - **Local hub**: in-process transport for tests and single-process demos
//! - **TCP transport**: newline-delimited JSON envelopes with background dialing
//! - **Node manager**: one task per node serializing inbound payloads, local
//!   commands and probe ticks
//!
//! ## Example
//!
//! ```rust,no_run
//! use netroute_routing::{Mode, Router, SeenMessages};
//! use netroute_session::{LocalHub, NodeConfig, NodeManager};
//! use netroute_topology::Directory;
//! use netroute_wire::{Address, NodeId};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let directory = Arc::new(Directory::from_documents(
//!     r#"{"type": "topo", "config": {"A": ["B"], "B": ["A"]}}"#,
//!     r#"{"type": "names", "config": {"A": "a@local", "B": "b@local"}}"#,
//! )?);
//!
//! let hub = LocalHub::new();
//! let (transport, events) = hub.register(Address::from("a@local")).await;
//! let router = Router::new(NodeId::from("A"), directory, Mode::LinkState, SeenMessages::unbounded())?;
//! let (manager, handle) = NodeManager::new(router, Arc::new(transport), events, NodeConfig::default());
//!
//! tokio::spawn(manager.run(std::future::pending()));
//! handle.send(NodeId::from("B"), "hello").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod local;
pub mod manager;
pub mod tcp;
pub mod transport;

// Re-export main types
pub use error::{NodeError, TransportError};
pub use local::{LocalHub, LocalTransport};
pub use manager::{NodeCommand, NodeConfig, NodeHandle, NodeManager};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportEvent};
