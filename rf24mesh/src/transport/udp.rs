//! In-process UDP simulator transport (spec §6, "Simulator UDP framing").
//!
//! Each node binds six non-blocking UDP sockets on loopback, one per pipe,
//! at the ports [`crate::physical::simulator_port`] derives. A write is a
//! single 32-byte datagram to the peer's pipe-0 (parent) or pipe-N (child)
//! port, matching the real radio's "pipe = listen address" model closely
//! enough that the router code above this layer never needs to know which
//! transport it's running over.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use crate::address::LogicalAddress;
use crate::config::{DataRate, PowerAmplitude};
use crate::frame::PACKET_WIDTH;
use crate::physical::{self, PhysicalLink, WriteOutcome};

/// Six non-blocking UDP sockets bound to the ports this node's logical
/// address derives, one per RX pipe (spec §4.2 "pipe 0 is the TX pipe /
/// parent-listen pipe").
pub struct UdpPhysicalLink {
    local: LogicalAddress,
    sockets: Vec<UdpSocket>,
}

impl UdpPhysicalLink {
    pub fn new() -> UdpPhysicalLink {
        UdpPhysicalLink {
            local: crate::address::RSVD_ADDR_INVALID,
            sockets: Vec::new(),
        }
    }

    fn bind_all(&mut self, local: LogicalAddress) -> std::io::Result<()> {
        let mut sockets = Vec::with_capacity(physical::MAX_NUM_PIPES as usize);
        for pipe in 0..physical::MAX_NUM_PIPES as u8 {
            let port = physical::simulator_port(local, pipe);
            let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
            let socket = UdpSocket::bind(addr)?;
            socket.set_nonblocking(true)?;
            sockets.push(socket);
        }
        self.sockets = sockets;
        Ok(())
    }
}

impl Default for UdpPhysicalLink {
    fn default() -> Self {
        UdpPhysicalLink::new()
    }
}

impl PhysicalLink for UdpPhysicalLink {
    fn init(&mut self, local: LogicalAddress) -> Result<(), std::io::Error> {
        self.local = local;
        self.bind_all(local)
    }

    fn write(
        &mut self,
        dst_logical: LogicalAddress,
        dst_pipe: u8,
        frame: &[u8; PACKET_WIDTH],
    ) -> Result<WriteOutcome, std::io::Error> {
        let port = physical::simulator_port(dst_logical, dst_pipe);
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        // UDP delivers best-effort; the simulator treats a successful
        // `send_to` as an immediate ACK and any send-side I/O error as a
        // NAK rather than surfacing it, matching the radio's binary
        // ok/nak contract (spec §6).
        let local_socket = self.sockets.first();
        match local_socket {
            Some(socket) => match socket.send_to(frame, addr) {
                Ok(_) => Ok(WriteOutcome::Ok),
                Err(_) => Ok(WriteOutcome::Nak),
            },
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "physical link not initialized",
            )),
        }
    }

    fn poll(&mut self) -> Option<(u8, [u8; PACKET_WIDTH])> {
        for (pipe, socket) in self.sockets.iter().enumerate() {
            let mut buf = [0u8; PACKET_WIDTH];
            match socket.recv(&mut buf) {
                Ok(n) if n == PACKET_WIDTH => return Some((pipe as u8, buf)),
                _ => continue,
            }
        }
        None
    }

    fn set_channel(&mut self, _channel: u8) {
        // The simulator has no notion of an RF channel; accepted for
        // interface parity with hardware links.
    }

    fn set_data_rate(&mut self, _rate: DataRate) {}

    fn set_power_amplitude(&mut self, _pa: PowerAmplitude) {}
}
