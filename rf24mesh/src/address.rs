//! Pure functions over 16-bit hierarchical logical addresses (spec §4.1).
//!
//! An address is conceptually five base-6 "octal" digits `d4 d3 d2 d1 d0`,
//! each restricted to `{0..=5}`, with `d0` the digit assigned at level 1 (a
//! direct child of the root), `d1` the digit assigned at level 2, and so on.
//! A node's address is built by repeatedly calling [`get_child`]: the first
//! child of the root gets digit `d0`, a child of that node gets digit `d1`
//! placed one group higher, etc. This is the addressing scheme of the
//! NRF24L01-based mesh this crate talks to; see `SPEC_FULL.md` for the
//! worked examples that pin down `level`/`id_at_level`/`get_child`.
//!
//! Every function here is total: invalid input produces a sentinel, never a
//! panic.

use std::fmt;

/// 16-bit hierarchical logical address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogicalAddress(pub u16);

/// Sentinel returned by [`LogicalAddress::level`] and [`level_of`] for
/// invalid input.
pub const NODE_LEVEL_INVALID: i8 = -1;

/// Sentinel returned by [`id_at_level`] for invalid input.
pub const NODE_ID_INVALID: i8 = -1;

/// The `id_at_level` value that marks "this is the root", returned only for
/// `L == 0` on a root address.
pub const NODE_ID_ROOT: i8 = 0;

pub const NODE_ID_1: i8 = 1;
pub const NODE_ID_2: i8 = 2;
pub const NODE_ID_3: i8 = 3;
pub const NODE_ID_4: i8 = 4;
pub const NODE_ID_5: i8 = 5;

/// Reserved sentinel addresses (spec §3, §6). None of these are ever
/// routable destinations.
pub const RSVD_ADDR_MULTICAST: LogicalAddress = LogicalAddress(0o77777);
pub const RSVD_ADDR_ROUTED: LogicalAddress = LogicalAddress(0xFFFE);
pub const RSVD_ADDR_INVALID: LogicalAddress = LogicalAddress(0xFFFF);
pub const RSVD_ADDR_LOOKUP: LogicalAddress = LogicalAddress(0xFFFD);

/// The address of the mesh root. The only address `is_root` ever considers
/// reachable as a routing root (see `DESIGN.md`, "alternate roots").
pub const ROOT_NODE_0: LogicalAddress = LogicalAddress(0);

const MAX_LEVEL: u32 = 5;
const DIGIT_BITS: u32 = 3;
const DIGIT_MASK: u16 = 0b111;

/// One of the five child bind sites, or one of the three non-child sites.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BindSite {
    Parent,
    Child1,
    Child2,
    Child3,
    Child4,
    Child5,
    Multicast,
    Invalid,
}

impl BindSite {
    pub const CHILDREN: [BindSite; 5] = [
        BindSite::Child1,
        BindSite::Child2,
        BindSite::Child3,
        BindSite::Child4,
        BindSite::Child5,
    ];

    /// The child digit (1..=5) this site inserts into an address, or `None`
    /// for non-child sites.
    pub fn child_digit(self) -> Option<u16> {
        match self {
            BindSite::Child1 => Some(1),
            BindSite::Child2 => Some(2),
            BindSite::Child3 => Some(3),
            BindSite::Child4 => Some(4),
            BindSite::Child5 => Some(5),
            _ => None,
        }
    }

    fn from_child_digit(digit: u16) -> BindSite {
        match digit {
            1 => BindSite::Child1,
            2 => BindSite::Child2,
            3 => BindSite::Child3,
            4 => BindSite::Child4,
            5 => BindSite::Child5,
            _ => BindSite::Invalid,
        }
    }

    /// The RX pipe index a radio would use for this bind site: 0 for
    /// `Parent`, 1..=5 for `Child1..Child5` (spec §4.2). Non-pipe sites
    /// return `None`.
    pub fn pipe(self) -> Option<u8> {
        match self {
            BindSite::Parent => Some(0),
            BindSite::Child1 => Some(1),
            BindSite::Child2 => Some(2),
            BindSite::Child3 => Some(3),
            BindSite::Child4 => Some(4),
            BindSite::Child5 => Some(5),
            BindSite::Multicast | BindSite::Invalid => None,
        }
    }
}

impl LogicalAddress {
    pub const fn new(raw: u16) -> LogicalAddress {
        LogicalAddress(raw)
    }

    /// True iff `self` is one of the reserved sentinel addresses.
    pub fn is_reserved(self) -> bool {
        self == RSVD_ADDR_MULTICAST
            || self == RSVD_ADDR_ROUTED
            || self == RSVD_ADDR_INVALID
            || self == RSVD_ADDR_LOOKUP
    }

    /// True iff every octal digit of `self` is in `{0..=5}` and `self` is
    /// not a reserved sentinel (spec §4.1).
    pub fn is_valid(self) -> bool {
        if self.is_reserved() {
            return false;
        }
        if self.0 >> 15 != 0 {
            return false;
        }
        (1..=MAX_LEVEL).all(|l| raw_digit(self.0, l) <= 5)
    }

    /// True iff `self` is valid and has no populated digit (`level() == 0`).
    pub fn is_root(self) -> bool {
        self.is_valid() && self.level() == 0
    }

    /// 0 for the root; otherwise the 1-based position of the
    /// highest-order non-zero octal digit; `NODE_LEVEL_INVALID` if `self`
    /// is not valid.
    pub fn level(self) -> i8 {
        if !self.is_valid() {
            return NODE_LEVEL_INVALID;
        }
        for l in (1..=MAX_LEVEL).rev() {
            if raw_digit(self.0, l) != 0 {
                return l as i8;
            }
        }
        0
    }

    /// Extracts the `l`-th octal digit (1-based, `l == 0` queries "is this
    /// the root"). See module docs for the exact contract.
    pub fn id_at_level(self, l: i8) -> i8 {
        if !self.is_valid() {
            return NODE_ID_INVALID;
        }
        if l == 0 {
            return if self.is_root() {
                NODE_ID_ROOT
            } else {
                NODE_ID_INVALID
            };
        }
        if l < 1 || l as u32 > self.level().max(0) as u32 {
            return NODE_ID_INVALID;
        }
        let digit = raw_digit(self.0, l as u32);
        if (1..=5).contains(&digit) {
            digit as i8
        } else {
            NODE_ID_INVALID
        }
    }

    /// Clears the lowest non-zero octal digit; `RSVD_ADDR_INVALID` for an
    /// invalid address or the root.
    pub fn parent(self) -> LogicalAddress {
        if !self.is_valid() {
            return RSVD_ADDR_INVALID;
        }
        let level = self.level();
        if level <= 0 {
            return RSVD_ADDR_INVALID;
        }
        self.address_at_level(level - 1)
    }

    /// The ancestor of `self` at level `l`: the address truncated to its
    /// lowest `l` digit groups. `RSVD_ADDR_INVALID` when `l` is out of
    /// range for `self`.
    pub fn address_at_level(self, l: i8) -> LogicalAddress {
        if !self.is_valid() || l < 0 || l as u32 > MAX_LEVEL {
            return RSVD_ADDR_INVALID;
        }
        if l as u32 > self.level().max(0) as u32 {
            return RSVD_ADDR_INVALID;
        }
        let bits = DIGIT_BITS * l as u32;
        let mask = if bits >= 16 { u16::MAX } else { (1u16 << bits) - 1 };
        LogicalAddress(self.0 & mask)
    }

    /// Inserts `site`'s child digit at the position immediately above
    /// `self`'s current level. Fails (`RSVD_ADDR_INVALID`) when `self` is
    /// invalid, `site` has no child digit, the result would exceed five
    /// levels, or any of `self`'s populated digits is outside `1..=5`
    /// (a "gap" address such as `0o30`, see `DESIGN.md`).
    pub fn get_child(self, site: BindSite) -> LogicalAddress {
        let digit = match site.child_digit() {
            Some(d) => d,
            None => return RSVD_ADDR_INVALID,
        };
        if !self.is_valid() {
            return RSVD_ADDR_INVALID;
        }
        let level = self.level().max(0) as u32;
        if level >= MAX_LEVEL {
            return RSVD_ADDR_INVALID;
        }
        for l in 1..=level {
            let d = raw_digit(self.0, l);
            if !(1..=5).contains(&d) {
                return RSVD_ADDR_INVALID;
            }
        }
        LogicalAddress(self.0 | (digit << (DIGIT_BITS * level)))
    }

    /// The RX pipe on `self` that a frame from `src` would arrive on:
    /// `Parent` if `src` is `self`'s parent, `ChildN` if `src` is the
    /// direct child reached through that site, else `Invalid`.
    pub fn pipe_of_incoming(self, src: LogicalAddress) -> BindSite {
        if !self.is_valid() || !src.is_valid() {
            return BindSite::Invalid;
        }
        if self != ROOT_NODE_0 && src == self.parent() {
            return BindSite::Parent;
        }
        for site in BindSite::CHILDREN {
            if self.get_child(site) == src {
                return site;
            }
        }
        BindSite::Invalid
    }
}

/// `true` iff `parent != child`, both are valid, and `child`'s ancestor at
/// `parent`'s level equals `parent`. The root is an ancestor of every
/// non-root valid address.
pub fn is_descendant(parent: LogicalAddress, child: LogicalAddress) -> bool {
    if parent == child || !parent.is_valid() || !child.is_valid() {
        return false;
    }
    child.address_at_level(parent.level()) == parent
}

/// [`is_descendant`] restricted to one level of separation.
pub fn is_direct_descendant(parent: LogicalAddress, child: LogicalAddress) -> bool {
    is_descendant(parent, child) && child.level() == parent.level() + 1
}

fn raw_digit(raw: u16, level: u32) -> u16 {
    (raw >> (DIGIT_BITS * (level - 1))) & DIGIT_MASK
}

impl fmt::Debug for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalAddress(0o{:o})", self.0)
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0o{:o}", self.0)
    }
}

impl From<u16> for LogicalAddress {
    fn from(raw: u16) -> Self {
        LogicalAddress(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recovered verbatim (as Rust literals) from the original RF24Node test
    // vectors in `test_utility.cpp`; not transliterated code, just the same
    // table of inputs/outputs.
    #[test]
    fn invalid_digit_alphabet() {
        for &raw in &[
            0o6666u16, 0o7001, 0o0701, 0o0071, 0o0007, 0o1536, 0o2371, 0o3722, 0o6243, 0o77770,
            0o7770,
        ] {
            let a = LogicalAddress(raw);
            assert!(!a.is_valid(), "{:o} should be invalid", raw);
            assert_eq!(a.parent(), RSVD_ADDR_INVALID);
            assert_eq!(a.level(), NODE_LEVEL_INVALID);
        }
    }

    #[test]
    fn level_extraction() {
        let a = LogicalAddress(0o54320);
        assert_eq!(a.id_at_level(0), NODE_ID_INVALID); // not a root
        assert_eq!(a.id_at_level(1), NODE_ID_INVALID);
        assert_eq!(a.id_at_level(2), NODE_ID_2);
        assert_eq!(a.id_at_level(3), NODE_ID_3);
        assert_eq!(a.id_at_level(4), NODE_ID_4);
        assert_eq!(a.id_at_level(5), NODE_ID_5);
    }

    #[test]
    fn root_id_at_level_zero() {
        assert_eq!(ROOT_NODE_0.id_at_level(0), NODE_ID_ROOT);
    }

    #[test]
    fn descendant_property() {
        assert!(is_descendant(LogicalAddress(0o1), LogicalAddress(0o52341)));
        assert!(is_descendant(LogicalAddress(0o11), LogicalAddress(0o42311)));
        assert!(is_descendant(LogicalAddress(0o13), LogicalAddress(0o313)));
        assert!(is_direct_descendant(LogicalAddress(0o13), LogicalAddress(0o313)));
        assert!(!is_descendant(LogicalAddress(0o11111), LogicalAddress(0o11111)));
    }

    #[test]
    fn child_generation_boundaries() {
        let root = ROOT_NODE_0;
        assert_eq!(root.get_child(BindSite::Child1), LogicalAddress(0o1));
        assert_eq!(root.get_child(BindSite::Child2), LogicalAddress(0o2));
        assert_eq!(root.get_child(BindSite::Child3), LogicalAddress(0o3));
        assert_eq!(root.get_child(BindSite::Child4), LogicalAddress(0o4));
        assert_eq!(root.get_child(BindSite::Child5), LogicalAddress(0o5));

        assert_eq!(
            LogicalAddress(0o3333).get_child(BindSite::Child4),
            LogicalAddress(0o43333)
        );
        assert_eq!(
            LogicalAddress(0o5555).get_child(BindSite::Child5),
            LogicalAddress(0o55555)
        );
        assert_eq!(RSVD_ADDR_INVALID.get_child(BindSite::Child1), RSVD_ADDR_INVALID);
        assert_eq!(
            LogicalAddress(0o6555).get_child(BindSite::Child1),
            RSVD_ADDR_INVALID
        );
    }

    #[test]
    fn parent_child_round_trip() {
        for raw in 0u16..0o77777 {
            let a = LogicalAddress(raw);
            if a.is_valid() && a.level() > 0 {
                let site_digit = a.id_at_level(a.level());
                if site_digit < 1 || site_digit > 5 {
                    continue;
                }
                let site = BindSite::from_child_digit(site_digit as u16);
                let parent = a.parent();
                assert_eq!(parent.get_child(site), a);
            }
        }
    }

    #[test]
    fn descendant_closure() {
        for raw in 0u16..0o77777 {
            let c = LogicalAddress(raw);
            if !c.is_valid() || c.level() <= 0 {
                continue;
            }
            for l in 1..c.level() {
                assert!(is_descendant(c.address_at_level(l), c));
            }
            assert!(!is_descendant(c.address_at_level(c.level()), c));
        }
    }

    #[test]
    fn alternate_roots_are_valid_but_not_tree_roots() {
        // These are "root-shaped" in that their lowest digit is zero, but
        // they have a populated digit above that gap, so `level()` is > 0
        // and they are not roots (see DESIGN.md / SPEC_FULL.md §9). Unlike
        // `0o77770`/`0o7770`, every digit here is in range, so `is_valid`
        // holds.
        for &raw in &[0o1000u16, 0o200, 0o30] {
            let a = LogicalAddress(raw);
            assert!(a.is_valid(), "{:o} should be valid", raw);
            assert!(!a.is_root(), "{:o} should not be a root", raw);
        }
        assert!(ROOT_NODE_0.is_root());
    }

    #[test]
    fn pipe_of_incoming_resolves_parent_and_children() {
        let node = LogicalAddress(0o12);
        assert_eq!(node.pipe_of_incoming(node.parent()), BindSite::Parent);
        for site in BindSite::CHILDREN {
            let child = node.get_child(site);
            assert_eq!(node.pipe_of_incoming(child), site);
        }
        assert_eq!(node.pipe_of_incoming(LogicalAddress(0o5555)), BindSite::Invalid);
    }
}
