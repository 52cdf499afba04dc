//! Network router: header/frame routing, outbound next-hop selection,
//! inbound demux, and the bounded RX/TX queues (spec §4.3).

use crate::address::{self, BindSite, LogicalAddress};
use crate::error::{MeshError, MeshResult};
use crate::frame::{Frame, MsgType, PACKET_WIDTH};
use crate::physical::{PhysicalLink, WriteOutcome};
use crate::queue::Queue;

/// Default retry budget for a single hop's physical transmission (spec
/// §4.3).
pub const MAX_HOP_RETRIES: u8 = 3;

/// Default hop budget: one more than the five-level maximum tree depth
/// (spec §4.3).
pub const MAX_HOPS: u8 = 6;

/// What the demux decided to do with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delivered to this node's RX queue; not a control frame.
    Delivered,
    /// Delivered to this node's RX queue and handed to the connection
    /// manager (it is a control frame).
    DeliveredControl,
    /// Forwarded further into the tree.
    Forwarded,
    /// Dropped: hop budget exhausted.
    DroppedHopLimit,
    /// Dropped: no valid next hop (misroute).
    DroppedMisroute,
    /// Dropped: RX or TX queue was full.
    DroppedQueueFull,
}

struct TxEntry {
    frame: Frame,
    next_hop: LogicalAddress,
    pipe: u8,
}

/// Owns the TX/RX queues and the physical link handle for one endpoint.
/// The router does not own the endpoint or the physical link itself — it
/// only holds a boxed handle to the link, passed in at construction (spec
/// §9 "cyclic ownership of layers": no reference cycles, collaborators are
/// handed in by reference/ownership at construction time instead).
pub struct NetworkRouter {
    local: LogicalAddress,
    link: Box<dyn PhysicalLink>,
    tx_queue: Queue<TxEntry>,
    rx_queue: Queue<Frame>,
    misroutes: u64,
    next_id: u16,
}

impl NetworkRouter {
    pub fn new(
        local: LogicalAddress,
        link: Box<dyn PhysicalLink>,
        rx_queue_size: usize,
        tx_queue_size: usize,
    ) -> NetworkRouter {
        NetworkRouter {
            local,
            link,
            tx_queue: Queue::new(tx_queue_size),
            rx_queue: Queue::new(rx_queue_size),
            misroutes: 0,
            // Seeded pseudo-randomly, not from zero, so ids from two
            // restarts of the same node don't collide on an in-flight
            // retry window (spec §3 "id: caller-assigned"). Mirrors
            // librips' `get_random_port` picking a pseudo-random ephemeral
            // port instead of counting up from a fixed start.
            next_id: rand::random(),
        }
    }

    pub fn local_address(&self) -> LogicalAddress {
        self.local
    }

    pub fn misroutes(&self) -> u64 {
        self.misroutes
    }

    pub fn next_frame_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Determines the next hop towards `dst` from `self.local` (spec
    /// §4.3 step 2): a child of `self.local` if `dst` is in that child's
    /// subtree, otherwise `self.local`'s parent.
    pub fn routing_step(&self, dst: LogicalAddress) -> MeshResult<LogicalAddress> {
        if address::is_descendant(self.local, dst) {
            let child_level = self.local.level().max(0) + 1;
            let next = dst.address_at_level(child_level);
            if next.is_valid() {
                return Ok(next);
            }
            return Err(MeshError::unreachable());
        }
        let parent = self.local.parent();
        if parent.is_valid() {
            Ok(parent)
        } else {
            Err(MeshError::unreachable())
        }
    }

    /// Enqueues a user payload for `dst`. Self-addressed sends are
    /// delivered directly to the RX queue (spec §4.3 step 1).
    pub fn write(
        &mut self,
        dst: LogicalAddress,
        payload: &[u8],
        msg_type: MsgType,
        id: u16,
    ) -> MeshResult<()> {
        if !dst.is_valid() && dst != address::RSVD_ADDR_MULTICAST {
            return Err(MeshError::invalid_address());
        }
        if dst == self.local {
            let frame = Frame::new(dst, self.local, msg_type, id, payload);
            if !self.rx_queue.push(frame) {
                return Err(MeshError::queue_full());
            }
            return Ok(());
        }
        let frame = Frame::new(dst, self.local, msg_type, id, payload);
        self.enqueue_outbound(frame)
    }

    fn enqueue_outbound(&mut self, frame: Frame) -> MeshResult<()> {
        let next_hop = self.routing_step(frame.dst)?;
        let pipe_site = next_hop.pipe_of_incoming(self.local);
        let pipe = match pipe_site {
            BindSite::Invalid => return Err(MeshError::unreachable()),
            site => site.pipe().ok_or_else(MeshError::unreachable)?,
        };
        let entry = TxEntry {
            frame,
            next_hop,
            pipe,
        };
        if self.tx_queue.push(entry) {
            Ok(())
        } else {
            Err(MeshError::queue_full())
        }
    }

    /// Drains the TX queue onto the physical link, retrying each frame up
    /// to `MAX_HOP_RETRIES` times on NAK (spec §4.3 step 4). Returns the
    /// number of frames that ultimately failed (`TX_FAIL`) in this pass.
    pub fn drain_tx(&mut self) -> u32 {
        let mut failures = 0;
        while let Some(entry) = self.tx_queue.pop() {
            let bytes = entry.frame.to_bytes();
            let link = &mut self.link;
            let result = retry_on_nak!(MAX_HOP_RETRIES, link.write(entry.next_hop, entry.pipe, &bytes));
            match result {
                Ok(WriteOutcome::Ok) => {}
                _ => {
                    failures += 1;
                    log::warn!(
                        "tx failed to {:o} via pipe {} after {} retries",
                        entry.next_hop.0,
                        entry.pipe,
                        MAX_HOP_RETRIES
                    );
                }
            }
        }
        failures
    }

    /// Polls the physical link for inbound frames and demuxes each one
    /// (spec §4.3 "receive path"). Control frames (`msg_type.is_control()`)
    /// are left in the RX queue for the connection manager to drain
    /// separately via [`NetworkRouter::pop_rx`]; this function only
    /// classifies and routes/forwards/drops.
    pub fn poll_inbound(&mut self) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        while let Some((_pipe, raw)) = self.link.poll() {
            dispositions.push(self.on_frame(raw));
        }
        dispositions
    }

    fn on_frame(&mut self, raw: [u8; PACKET_WIDTH]) -> Disposition {
        let frame = Frame::from_bytes(&raw);
        if !frame.src.is_valid() {
            self.misroutes += 1;
            return Disposition::DroppedMisroute;
        }
        let dst_ok = frame.dst.is_valid() || frame.dst == address::RSVD_ADDR_MULTICAST;
        if !dst_ok {
            self.misroutes += 1;
            return Disposition::DroppedMisroute;
        }

        let for_me = frame.dst == self.local || frame.dst == address::RSVD_ADDR_MULTICAST;
        if for_me {
            let is_control = frame.msg_type.is_control();
            return if self.rx_queue.push(frame) {
                if is_control {
                    Disposition::DeliveredControl
                } else {
                    Disposition::Delivered
                }
            } else {
                Disposition::DroppedQueueFull
            };
        }

        if frame.ttl == 0 {
            return Disposition::DroppedHopLimit;
        }
        // Not for us: forward it. `enqueue_outbound` resolves the next hop
        // via tree algebra regardless of branch (down into our subtree, or
        // up towards the common ancestor), so any non-local destination is
        // a forward candidate, not just a literal ancestor/descendant of
        // `self` (spec §4.3 step 3: "dstNode is above us" covers any
        // destination outside our subtree).
        let forwarded = frame.with_ttl(frame.ttl - 1);
        match self.enqueue_outbound(forwarded) {
            Ok(()) => Disposition::Forwarded,
            Err(e) if e.kind == crate::error::ErrorKind::QueueFull => Disposition::DroppedQueueFull,
            Err(_) => {
                self.misroutes += 1;
                Disposition::DroppedMisroute
            }
        }
    }

    /// Pops one frame from the RX queue (data or control).
    pub fn pop_rx(&mut self) -> Option<Frame> {
        self.rx_queue.pop()
    }

    pub fn peek_rx(&self) -> Option<&Frame> {
        self.rx_queue.peek()
    }

    pub fn rx_available(&self) -> bool {
        !self.rx_queue.is_empty()
    }

    pub fn link_mut(&mut self) -> &mut dyn PhysicalLink {
        &mut *self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NullPhysicalLink;

    fn router_for(addr: u16) -> NetworkRouter {
        NetworkRouter::new(
            LogicalAddress(addr),
            Box::new(NullPhysicalLink::new()),
            16,
            16,
        )
    }

    #[test]
    fn routing_step_descends_towards_child() {
        let router = router_for(0o1); // node 0o1, a direct child of root
        let next = router.routing_step(LogicalAddress(0o21)).unwrap();
        assert_eq!(next, LogicalAddress(0o21)); // direct child already
        let next2 = router.routing_step(LogicalAddress(0o321)).unwrap();
        assert_eq!(next2, LogicalAddress(0o21));
    }

    #[test]
    fn routing_step_ascends_towards_parent() {
        let router = router_for(0o21);
        let next = router.routing_step(LogicalAddress(0o0)).unwrap();
        assert_eq!(next, LogicalAddress(0o1));
    }

    #[test]
    fn self_addressed_write_delivers_locally() {
        let mut router = router_for(0o1);
        router
            .write(LogicalAddress(0o1), b"hi", MsgType::TxNormal, 1)
            .unwrap();
        let frame = router.pop_rx().unwrap();
        assert_eq!(frame.payload(), b"hi");
    }

    #[test]
    fn unreachable_when_no_path_exists() {
        let router = router_for(0o0);
        // Root has no parent and 0o0 is not an ancestor of an invalid addr.
        let err = router.routing_step(crate::address::RSVD_ADDR_INVALID);
        assert!(err.is_err());
    }

    #[test]
    fn inbound_frame_to_a_different_branch_is_forwarded_up() {
        // Node 0o1 sits on an intermediate hop. A frame arrives from its
        // own child (0o21) addressed to 0o2, a sibling branch under root:
        // 0o1 is neither an ancestor nor a descendant of 0o2, but the
        // common ancestor (root) is still reachable via `self`'s parent,
        // so this must forward, not drop as a misroute.
        let mut router = router_for(0o1);
        let frame = Frame::new(
            LogicalAddress(0o2),
            LogicalAddress(0o21),
            MsgType::TxNormal,
            1,
            b"hi",
        );
        let disposition = router.on_frame(frame.to_bytes());
        assert_eq!(disposition, Disposition::Forwarded);
        assert_eq!(router.misroutes(), 0);
    }
}
