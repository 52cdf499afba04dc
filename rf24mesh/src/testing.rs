//! Test doubles, gated behind the `testing` feature so the CLI and
//! integration tests can build nodes without a real radio.

use std::collections::VecDeque;

use crate::address::LogicalAddress;
use crate::config::{DataRate, PowerAmplitude};
use crate::frame::PACKET_WIDTH;
use crate::physical::{PhysicalLink, WriteOutcome};

/// A [`PhysicalLink`] that never transmits anything; `write` always
/// succeeds and `poll` always returns `None` unless frames are injected
/// with [`NullPhysicalLink::inject`]. Used by unit tests that only need to
/// exercise routing decisions, not an actual transport.
pub struct NullPhysicalLink {
    local: LogicalAddress,
    inbox: VecDeque<(u8, [u8; PACKET_WIDTH])>,
    pub sent: Vec<(LogicalAddress, u8, [u8; PACKET_WIDTH])>,
}

impl NullPhysicalLink {
    pub fn new() -> NullPhysicalLink {
        NullPhysicalLink {
            local: crate::address::RSVD_ADDR_INVALID,
            inbox: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn inject(&mut self, pipe: u8, frame: [u8; PACKET_WIDTH]) {
        self.inbox.push_back((pipe, frame));
    }
}

impl Default for NullPhysicalLink {
    fn default() -> Self {
        NullPhysicalLink::new()
    }
}

impl PhysicalLink for NullPhysicalLink {
    fn init(&mut self, local: LogicalAddress) -> Result<(), std::io::Error> {
        self.local = local;
        Ok(())
    }

    fn write(
        &mut self,
        dst_logical: LogicalAddress,
        dst_pipe: u8,
        frame: &[u8; PACKET_WIDTH],
    ) -> Result<WriteOutcome, std::io::Error> {
        self.sent.push((dst_logical, dst_pipe, *frame));
        Ok(WriteOutcome::Ok)
    }

    fn poll(&mut self) -> Option<(u8, [u8; PACKET_WIDTH])> {
        self.inbox.pop_front()
    }

    fn set_channel(&mut self, _channel: u8) {}
    fn set_data_rate(&mut self, _rate: DataRate) {}
    fn set_power_amplitude(&mut self, _pa: PowerAmplitude) {}
}
