//! Endpoint configuration record (spec §3 "EndpointConfig").

use std::time::Duration;

use crate::address::LogicalAddress;

/// How a node's logical address and parent are determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Address and parent are fixed by configuration.
    Static,
    /// Address/parent may be negotiated dynamically (spec §9,
    /// `RSVD_ADDR_LOOKUP`).
    Mesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Mbps1,
    Mbps2,
    Kbps250,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAmplitude {
    Low,
    Med,
    High,
    Max,
}

/// Configuration record passed to `Endpoint::configure` (spec §3, §4.5).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub mode: Mode,
    pub node_static_address: LogicalAddress,
    pub parent_static_address: LogicalAddress,
    pub rx_queue_size: usize,
    pub tx_queue_size: usize,
    pub data_rate: DataRate,
    pub power_amplitude: PowerAmplitude,
    pub rf_channel: u8,
    pub device_name: String,
    /// Budget for a `REQUESTING` bind site before it falls back to
    /// `UNBOUND` (spec §4.4 `ConnectTimeout`, default 10s).
    pub connect_timeout: Duration,
    /// Cadence at which a `BOUND` site is re-probed with `NET_PING` to
    /// detect a silently vanished peer (spec §4.4 "liveness missed N
    /// times"). A probe left unacknowledged by the next cycle counts as one
    /// miss; `MAX_MISSED_LIVENESS` consecutive misses expires the site.
    pub liveness_interval: Duration,
    /// Cadence at which a caller is expected to invoke
    /// `do_async_processing` (spec §4.5, "typical: every 15ms thread
    /// tick"). Informational for `Endpoint::run`; not enforced on callers
    /// driving the tick manually.
    pub tick_interval: Duration,
}

/// Default frame capacity for RX/TX queues: `5 * PACKET_WIDTH` frames
/// (spec §3).
pub const DEFAULT_QUEUE_SIZE: usize = 5 * crate::frame::PACKET_WIDTH;

impl EndpointConfig {
    /// A `STATIC` mode config for a root node (no parent).
    pub fn root(device_name: impl Into<String>) -> EndpointConfig {
        EndpointConfig {
            mode: Mode::Static,
            node_static_address: crate::address::ROOT_NODE_0,
            parent_static_address: crate::address::RSVD_ADDR_INVALID,
            rx_queue_size: DEFAULT_QUEUE_SIZE,
            tx_queue_size: DEFAULT_QUEUE_SIZE,
            data_rate: DataRate::Mbps1,
            power_amplitude: PowerAmplitude::High,
            rf_channel: 76,
            device_name: device_name.into(),
            connect_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_millis(15),
            liveness_interval: Duration::from_secs(1),
        }
    }

    /// A `MESH` mode config that resolves its parent dynamically at
    /// `connect` time, by walking the tree algebra up from `node` rather
    /// than requiring the caller to also supply a separate parent address
    /// (spec §9 "`RSVD_ADDR_LOOKUP` semantics": "parent = resolve at
    /// runtime"). `node` must still be a concrete, already-assigned
    /// address: this crate does not implement dynamic address assignment,
    /// only dynamic parent resolution (see `DESIGN.md`).
    pub fn mesh(device_name: impl Into<String>, node: LogicalAddress) -> EndpointConfig {
        EndpointConfig {
            mode: Mode::Mesh,
            node_static_address: node,
            parent_static_address: crate::address::RSVD_ADDR_LOOKUP,
            ..EndpointConfig::root(device_name)
        }
    }

    /// A `STATIC` mode config for a non-root node with a known parent.
    pub fn child(
        device_name: impl Into<String>,
        node: LogicalAddress,
        parent: LogicalAddress,
    ) -> EndpointConfig {
        EndpointConfig {
            node_static_address: node,
            parent_static_address: parent,
            ..EndpointConfig::root(device_name)
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::MeshError> {
        if self.rf_channel > 125 {
            return Err(crate::error::MeshError::invalid_address());
        }
        if !self.node_static_address.is_valid() {
            return Err(crate::error::MeshError::invalid_address());
        }
        match self.mode {
            Mode::Static => {
                if self.node_static_address != crate::address::ROOT_NODE_0
                    && !self.parent_static_address.is_valid()
                {
                    return Err(crate::error::MeshError::invalid_address());
                }
                if self.parent_static_address == crate::address::RSVD_ADDR_LOOKUP {
                    // Static mode requires an explicit parent (spec §9).
                    return Err(crate::error::MeshError::invalid_address());
                }
            }
            Mode::Mesh => {
                if self.node_static_address != crate::address::ROOT_NODE_0
                    && self.parent_static_address != crate::address::RSVD_ADDR_LOOKUP
                    && !self.parent_static_address.is_valid()
                {
                    return Err(crate::error::MeshError::invalid_address());
                }
            }
        }
        Ok(())
    }
}
