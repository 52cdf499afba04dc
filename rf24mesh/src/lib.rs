//! # rf24mesh
//!
//! Multi-hop mesh networking over an NRF24L01-class packet radio, as used
//! by RF24Network/RF24Mesh-style deployments: nodes organize into a fixed
//! five-level octal address tree, a small router hops frames up and down
//! that tree, and a connection manager handles joining a parent and
//! detecting a dead one.
//!
//! Three pieces make up the public surface:
//!
//! - [`address`] — pure address algebra (`LogicalAddress`, `BindSite`).
//! - [`router`] — the frame router and its bounded TX/RX queues.
//! - [`endpoint`] — [`endpoint::Endpoint`], the facade most callers use.
//!
//! Two physical links ship: [`transport::UdpPhysicalLink`], an in-process
//! UDP simulator useful for multi-node tests without hardware, and
//! (behind the `testing` feature) [`testing::NullPhysicalLink`], a no-op
//! double for routing-only unit tests.
//!
//! ```no_run
//! use std::time::Duration;
//! use rf24mesh::config::EndpointConfig;
//! use rf24mesh::endpoint::Endpoint;
//! use rf24mesh::transport::UdpPhysicalLink;
//!
//! let mut root = Endpoint::new();
//! root.configure(EndpointConfig::root("root"), Box::new(UdpPhysicalLink::new())).unwrap();
//!
//! let mut leaf = Endpoint::new();
//! leaf.configure(
//!     EndpointConfig::child("leaf", rf24mesh::address::LogicalAddress(0o1), rf24mesh::address::ROOT_NODE_0),
//!     Box::new(UdpPhysicalLink::new()),
//! ).unwrap();
//! leaf.connect(Duration::from_secs(1)).unwrap();
//! ```

#[macro_use]
mod macros;

pub mod address;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod log_sink;
pub mod physical;
pub mod queue;
pub mod router;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use address::LogicalAddress;
pub use endpoint::Endpoint;
pub use error::{MeshError, MeshResult};
