//! Concrete [`crate::physical::PhysicalLink`] implementations.

mod udp;

pub use udp::UdpPhysicalLink;
