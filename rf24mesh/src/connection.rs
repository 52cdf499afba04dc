//! Connection manager: per-bind-site state machine, connect/connectAsync,
//! ping, and liveness (spec §4.4).
//!
//! Timeouts are derived from a free-running instant compared inside the
//! tick loop (`tick`), never from an OS timer callback (spec §9 "Timers").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::address::{self, BindSite, LogicalAddress};
use crate::error::MeshError;
use crate::frame::MsgType;

/// Liveness budget: a `BOUND` site becomes `EXPIRED` after this many missed
/// ping cycles (spec §4.4, "optional in STATIC mode" — root/static
/// deployments may simply never invoke the liveness check).
pub const MAX_MISSED_LIVENESS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Requesting,
    Bound,
    Expired,
}

/// Outcome handed to a `connectAsync` callback (spec §4.4 transition
/// table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    Timeout,
    Refused,
    Cancelled,
}

struct SiteRecord {
    state: ConnectionState,
    peer: LogicalAddress,
    deadline: Option<Instant>,
    missed: u32,
    request_id: u16,
    /// When a liveness `NET_PING` was last sent to this site.
    last_liveness_probe: Option<Instant>,
    /// True while that probe's `NET_PING_ACK` is still outstanding.
    liveness_ack_pending: bool,
}

impl SiteRecord {
    fn unbound() -> SiteRecord {
        SiteRecord {
            state: ConnectionState::Unbound,
            peer: address::RSVD_ADDR_INVALID,
            deadline: None,
            missed: 0,
            request_id: 0,
            last_liveness_probe: None,
            liveness_ack_pending: false,
        }
    }
}

/// Something the connection manager wants sent on the wire; the caller
/// (the [`crate::endpoint::Endpoint`]) hands this to the router.
pub struct Outbound {
    pub dst: LogicalAddress,
    pub msg_type: MsgType,
    pub id: u16,
    pub payload: Vec<u8>,
}

type ConnectCallback = Box<dyn FnOnce(BindSite, ConnectOutcome) + Send>;

/// Per-endpoint bind-site table and pending-callback bookkeeping.
pub struct ConnectionManager {
    local: LogicalAddress,
    sites: HashMap<BindSite, SiteRecord>,
    parent: LogicalAddress,
    connect_timeout: Duration,
    liveness_interval: Duration,
    pending_connect: Option<ConnectCallback>,
    pending_pings: HashMap<u16, Instant>,
    liveness_inflight: HashMap<u16, BindSite>,
    next_liveness_id: u16,
}

impl ConnectionManager {
    pub fn new(
        local: LogicalAddress,
        parent: LogicalAddress,
        connect_timeout: Duration,
        liveness_interval: Duration,
    ) -> ConnectionManager {
        let mut sites = HashMap::new();
        for site in BindSite::CHILDREN {
            sites.insert(site, SiteRecord::unbound());
        }
        // Root nodes have no parent bind site; non-root nodes start
        // `UNBOUND` on `Parent` until `connect` succeeds (spec §3
        // "ConnectionState").
        if local != address::ROOT_NODE_0 {
            sites.insert(BindSite::Parent, SiteRecord::unbound());
        }
        ConnectionManager {
            local,
            sites,
            parent,
            connect_timeout,
            liveness_interval,
            pending_connect: None,
            pending_pings: HashMap::new(),
            liveness_inflight: HashMap::new(),
            next_liveness_id: 0,
        }
    }

    /// The peer to send `CONNECT_REQUEST` to: the configured parent, or,
    /// when it is `RSVD_ADDR_LOOKUP` (`MESH` mode "resolve at runtime",
    /// spec §9), the tree-algebra parent of `self.local`. This crate does
    /// not implement dynamic address assignment, so "dynamic" here means
    /// the parent is derived rather than separately configured, not that
    /// it is discovered by probing unknown peers (see `DESIGN.md`).
    fn resolved_parent(&self) -> LogicalAddress {
        if self.parent == address::RSVD_ADDR_LOOKUP {
            self.local.parent()
        } else {
            self.parent
        }
    }

    pub fn state_of(&self, site: BindSite) -> ConnectionState {
        self.sites
            .get(&site)
            .map(|r| r.state)
            .unwrap_or(ConnectionState::Unbound)
    }

    pub fn is_connected(&self) -> bool {
        self.local == address::ROOT_NODE_0
            || self.state_of(BindSite::Parent) == ConnectionState::Bound
    }

    /// Begins connecting to the configured parent: `UNBOUND -> REQUESTING`.
    /// Returns the `CONNECT_REQUEST` frame to send and arms the timeout.
    /// `callback` is invoked with the bind site the outcome pertains to
    /// (always `Parent` here) alongside the outcome itself (spec §7:
    /// "errors in async callbacks carry both the kind and the originating
    /// bind site").
    ///
    /// Idempotent per spec §8 "Connection idempotence": called again while
    /// already `Requesting`, this is a no-op (no wire traffic, the original
    /// caller's callback stays pending); called while already `Bound`, it
    /// fires `callback` with `Success` immediately and sends nothing.
    pub fn connect_async(
        &mut self,
        callback: impl FnOnce(BindSite, ConnectOutcome) + Send + 'static,
    ) -> Result<Option<Outbound>, MeshError> {
        if self.local == address::ROOT_NODE_0 {
            return Err(MeshError::at(crate::error::ErrorKind::AlreadyConfigured, BindSite::Parent));
        }
        let record = self
            .sites
            .entry(BindSite::Parent)
            .or_insert_with(SiteRecord::unbound);
        if record.state == ConnectionState::Bound {
            callback(BindSite::Parent, ConnectOutcome::Success);
            return Ok(None);
        }
        if record.state == ConnectionState::Requesting {
            return Ok(None);
        }
        let target = self.resolved_parent();
        record.state = ConnectionState::Requesting;
        record.peer = target;
        record.deadline = Some(Instant::now() + self.connect_timeout);
        self.pending_connect = Some(Box::new(callback));
        Ok(Some(Outbound {
            dst: target,
            msg_type: MsgType::NetConnectRequest,
            id: 0,
            payload: self.local.0.to_le_bytes().to_vec(),
        }))
    }

    /// Cancels a pending `connectAsync`, invoking its callback with
    /// `Cancelled` and returning the site to `UNBOUND` (spec §5
    /// "Cancellation").
    pub fn disconnect(&mut self) {
        if let Some(record) = self.sites.get_mut(&BindSite::Parent) {
            record.state = ConnectionState::Unbound;
            record.deadline = None;
        }
        if let Some(cb) = self.pending_connect.take() {
            cb(BindSite::Parent, ConnectOutcome::Cancelled);
        }
    }

    /// Sends `NET_PING` to `dst`, returning the outbound frame and an id to
    /// match against the eventual `NET_PING_ACK`.
    pub fn ping(&mut self, dst: LogicalAddress, id: u16) -> Outbound {
        self.pending_pings.insert(id, Instant::now());
        Outbound {
            dst,
            msg_type: MsgType::NetPing,
            id,
            payload: Vec::new(),
        }
    }

    /// True if a ping with `id` is still outstanding and has not exceeded
    /// `timeout`.
    pub fn ping_pending(&self, id: u16, timeout: Duration) -> bool {
        match self.pending_pings.get(&id) {
            Some(sent_at) => sent_at.elapsed() < timeout,
            None => false,
        }
    }

    /// Processes one control frame, returning any reply the caller should
    /// enqueue through the router.
    pub fn on_control_frame(
        &mut self,
        src: LogicalAddress,
        msg_type: MsgType,
        id: u16,
    ) -> Option<Outbound> {
        match msg_type {
            MsgType::NetConnectRequest => self.on_connect_request(src),
            MsgType::NetConnectAck => {
                self.on_connect_ack();
                None
            }
            MsgType::NetConnectNack => {
                self.on_connect_nack();
                None
            }
            MsgType::NetDisconnect => {
                self.on_disconnect(src);
                None
            }
            MsgType::NetPing => Some(Outbound {
                dst: src,
                msg_type: MsgType::NetPingAck,
                id,
                payload: Vec::new(),
            }),
            MsgType::NetPingAck => {
                self.pending_pings.remove(&id);
                if let Some(site) = self.liveness_inflight.remove(&id) {
                    self.note_liveness(site);
                }
                None
            }
            _ => None,
        }
    }

    /// Parent-side handling of an inbound `CONNECT_REQUEST` (spec §4.4
    /// "On the parent side").
    fn on_connect_request(&mut self, child: LogicalAddress) -> Option<Outbound> {
        if !address::is_direct_descendant(self.local, child) {
            return Some(Outbound {
                dst: child,
                msg_type: MsgType::NetConnectNack,
                id: 0,
                payload: Vec::new(),
            });
        }
        let site = self.local.pipe_of_incoming(child);
        let record = self.sites.entry(site).or_insert_with(SiteRecord::unbound);
        let occupied_by_other = record.state == ConnectionState::Bound && record.peer != child;
        if occupied_by_other {
            return Some(Outbound {
                dst: child,
                msg_type: MsgType::NetConnectNack,
                id: 0,
                payload: Vec::new(),
            });
        }
        record.state = ConnectionState::Bound;
        record.peer = child;
        record.missed = 0;
        Some(Outbound {
            dst: child,
            msg_type: MsgType::NetConnectAck,
            id: 0,
            payload: Vec::new(),
        })
    }

    fn on_connect_ack(&mut self) {
        if let Some(record) = self.sites.get_mut(&BindSite::Parent) {
            if record.state == ConnectionState::Requesting {
                record.state = ConnectionState::Bound;
                record.deadline = None;
                record.missed = 0;
            }
        }
        if let Some(cb) = self.pending_connect.take() {
            cb(BindSite::Parent, ConnectOutcome::Success);
        }
    }

    fn on_connect_nack(&mut self) {
        if let Some(record) = self.sites.get_mut(&BindSite::Parent) {
            record.state = ConnectionState::Unbound;
            record.deadline = None;
        }
        if let Some(cb) = self.pending_connect.take() {
            cb(BindSite::Parent, ConnectOutcome::Refused);
        }
    }

    fn on_disconnect(&mut self, peer: LogicalAddress) {
        let site = self.local.pipe_of_incoming(peer);
        if let Some(record) = self.sites.get_mut(&site) {
            if record.peer == peer {
                record.state = ConnectionState::Unbound;
                record.peer = address::RSVD_ADDR_INVALID;
            }
        }
    }

    /// Called once per `doAsyncProcessing` tick: expires a `REQUESTING`
    /// site whose deadline has passed (spec §4.4 "timer elapsed"), then
    /// probes every `BOUND` site's liveness, returning any `NET_PING`
    /// frames the caller should send through the router.
    pub fn tick(&mut self) -> Vec<Outbound> {
        if let Some(record) = self.sites.get_mut(&BindSite::Parent) {
            if record.state == ConnectionState::Requesting {
                if let Some(deadline) = record.deadline {
                    if Instant::now() >= deadline {
                        record.state = ConnectionState::Unbound;
                        record.deadline = None;
                        if let Some(cb) = self.pending_connect.take() {
                            cb(BindSite::Parent, ConnectOutcome::Timeout);
                        }
                    }
                }
            }
        }
        self.poll_liveness()
    }

    /// Re-probes every `BOUND` site whose last liveness window has elapsed.
    /// A site whose previous probe never got a `NET_PING_ACK` counts one
    /// miss (spec §4.4 "liveness missed N times") before a fresh probe goes
    /// out.
    fn poll_liveness(&mut self) -> Vec<Outbound> {
        let now = Instant::now();
        let due: Vec<BindSite> = self
            .sites
            .iter()
            .filter(|(_, r)| r.state == ConnectionState::Bound)
            .filter(|(_, r)| {
                r.last_liveness_probe
                    .map(|sent| now.duration_since(sent) >= self.liveness_interval)
                    .unwrap_or(true)
            })
            .map(|(site, _)| *site)
            .collect();

        let mut outbound = Vec::new();
        for site in due {
            let ack_was_pending = self
                .sites
                .get(&site)
                .map(|r| r.liveness_ack_pending)
                .unwrap_or(false);
            if ack_was_pending {
                self.note_missed_liveness(site);
            }
            let peer = match self.sites.get(&site) {
                Some(r) if r.state == ConnectionState::Bound => r.peer,
                _ => continue,
            };
            let id = self.next_liveness_id;
            self.next_liveness_id = self.next_liveness_id.wrapping_add(1);
            self.liveness_inflight.insert(id, site);
            if let Some(record) = self.sites.get_mut(&site) {
                record.last_liveness_probe = Some(now);
                record.liveness_ack_pending = true;
            }
            outbound.push(Outbound {
                dst: peer,
                msg_type: MsgType::NetPing,
                id,
                payload: Vec::new(),
            });
        }
        outbound
    }

    /// Marks a `BOUND` site as having missed a liveness beat, expiring it
    /// after [`MAX_MISSED_LIVENESS`] consecutive misses (spec §4.4 "liveness
    /// missed N times").
    pub fn note_missed_liveness(&mut self, site: BindSite) {
        if let Some(record) = self.sites.get_mut(&site) {
            if record.state == ConnectionState::Bound {
                record.missed += 1;
                record.liveness_ack_pending = false;
                if record.missed >= MAX_MISSED_LIVENESS {
                    record.state = ConnectionState::Expired;
                }
            }
        }
    }

    pub fn note_liveness(&mut self, site: BindSite) {
        if let Some(record) = self.sites.get_mut(&site) {
            record.missed = 0;
            record.liveness_ack_pending = false;
            if record.state == ConnectionState::Expired {
                record.state = ConnectionState::Bound;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn manager(local: u16, parent: u16) -> ConnectionManager {
        ConnectionManager::new(
            LogicalAddress(local),
            LogicalAddress(parent),
            Duration::from_millis(50),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn connect_ack_binds_parent_site() {
        let mut mgr = manager(0o1, 0o0);
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        mgr.connect_async(move |site, outcome| {
            assert_eq!(site, BindSite::Parent);
            assert_eq!(outcome, ConnectOutcome::Success);
            called2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Requesting);
        mgr.on_control_frame(LogicalAddress(0o0), MsgType::NetConnectAck, 0);
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Bound);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn connect_nack_returns_to_unbound() {
        let mut mgr = manager(0o1, 0o0);
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        mgr.connect_async(move |site, outcome| {
            assert_eq!(site, BindSite::Parent);
            assert_eq!(outcome, ConnectOutcome::Refused);
            called2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        mgr.on_control_frame(LogicalAddress(0o0), MsgType::NetConnectNack, 0);
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Unbound);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn requesting_times_out() {
        let mut mgr = manager(0o1, 0o0);
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        mgr.connect_async(move |site, outcome| {
            assert_eq!(site, BindSite::Parent);
            assert_eq!(outcome, ConnectOutcome::Timeout);
            called2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        mgr.tick();
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Unbound);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn mesh_lookup_parent_resolves_via_tree_algebra() {
        // MESH mode with RSVD_ADDR_LOOKUP derives the CONNECT_REQUEST
        // destination from the node's own address instead of a configured
        // peer (spec §9).
        let mut mgr = manager(0o32, address::RSVD_ADDR_LOOKUP.0);
        let outbound = mgr.connect_async(|_, _| {}).unwrap().unwrap();
        assert_eq!(outbound.dst, LogicalAddress(0o32).parent());
        assert_eq!(outbound.dst, LogicalAddress(0o2));
    }

    #[test]
    fn parent_binds_direct_child_request() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        let reply = mgr.on_connect_request(LogicalAddress(0o3)).unwrap();
        assert_eq!(reply.msg_type, MsgType::NetConnectAck);
        assert_eq!(mgr.state_of(BindSite::Child3), ConnectionState::Bound);
    }

    #[test]
    fn parent_nacks_non_direct_descendant() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        let reply = mgr.on_connect_request(LogicalAddress(0o33)).unwrap();
        assert_eq!(reply.msg_type, MsgType::NetConnectNack);
    }

    #[test]
    fn expiry_after_missed_liveness() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        mgr.on_connect_request(LogicalAddress(0o2));
        let site = BindSite::Child2;
        for _ in 0..MAX_MISSED_LIVENESS {
            mgr.note_missed_liveness(site);
        }
        assert_eq!(mgr.state_of(site), ConnectionState::Expired);
    }

    #[test]
    fn tick_emits_liveness_probe_for_bound_site() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        mgr.on_connect_request(LogicalAddress(0o4));
        let probes = mgr.tick();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].dst, LogicalAddress(0o4));
        assert_eq!(probes[0].msg_type, MsgType::NetPing);
    }

    #[test]
    fn unacknowledged_liveness_probes_expire_the_site() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        mgr.on_connect_request(LogicalAddress(0o4));
        let site = BindSite::Child4;
        // Each tick past the liveness interval with no NET_PING_ACK in
        // between counts one miss; after MAX_MISSED_LIVENESS such ticks the
        // site expires without ever calling `note_missed_liveness` by hand.
        for _ in 0..MAX_MISSED_LIVENESS {
            std::thread::sleep(Duration::from_millis(25));
            mgr.tick();
        }
        assert_eq!(mgr.state_of(site), ConnectionState::Expired);
    }

    #[test]
    fn liveness_ack_keeps_site_bound() {
        let mut mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        mgr.on_connect_request(LogicalAddress(0o4));
        let site = BindSite::Child4;
        for _ in 0..(MAX_MISSED_LIVENESS + 2) {
            std::thread::sleep(Duration::from_millis(25));
            let probes = mgr.tick();
            for probe in probes {
                mgr.on_control_frame(LogicalAddress(0o4), MsgType::NetPingAck, probe.id);
            }
        }
        assert_eq!(mgr.state_of(site), ConnectionState::Bound);
    }

    #[test]
    fn root_is_always_connected() {
        let mgr = manager(0o0, address::RSVD_ADDR_INVALID.0);
        assert!(mgr.is_connected());
    }

    #[test]
    fn repeated_connect_async_while_requesting_is_a_no_op() {
        let mut mgr = manager(0o1, 0o0);
        let first_called = Arc::new(AtomicBool::new(false));
        let first_called2 = first_called.clone();
        mgr.connect_async(move |_, _| first_called2.store(true, Ordering::SeqCst))
            .unwrap()
            .expect("first call sends CONNECT_REQUEST");

        let second_called = Arc::new(AtomicBool::new(false));
        let second_called2 = second_called.clone();
        let second = mgr
            .connect_async(move |_, _| second_called2.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(second.is_none(), "no wire traffic while already requesting");
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Requesting);

        mgr.on_control_frame(LogicalAddress(0o0), MsgType::NetConnectAck, 0);
        assert!(
            first_called.load(Ordering::SeqCst),
            "the original caller's callback must still fire"
        );
        assert!(
            !second_called.load(Ordering::SeqCst),
            "the second caller's callback was dropped, not invoked"
        );
    }

    #[test]
    fn connect_async_while_bound_fires_success_without_wire_traffic() {
        let mut mgr = manager(0o1, 0o0);
        mgr.connect_async(|_, _| {}).unwrap();
        mgr.on_control_frame(LogicalAddress(0o0), MsgType::NetConnectAck, 0);
        assert_eq!(mgr.state_of(BindSite::Parent), ConnectionState::Bound);

        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let outbound = mgr
            .connect_async(move |site, outcome| {
                assert_eq!(site, BindSite::Parent);
                assert_eq!(outcome, ConnectOutcome::Success);
                called2.store(true, Ordering::SeqCst);
            })
            .unwrap();
        assert!(outbound.is_none(), "no wire traffic once already bound");
        assert!(called.load(Ordering::SeqCst), "callback fires immediately");
    }
}
