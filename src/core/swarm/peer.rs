//! Per-peer bookkeeping inside a swarm.
//!
//! A peer entry is deliberately tiny: the status bitset, the last check-in
//! timestamp and the back-indices into the swarm's per-category endpoint
//! tables. The transfer counters a peer reports on every announce are folded
//! into the swarm statistics instead of being stored here.
use helix_tracker_primitives::announce_event::AnnounceEvent;
use helix_tracker_primitives::report::ClientReport;

/// The peer's IPv4 endpoint passed a NAT check and is in the handout tables.
pub const IS_ROUTABLE_V4: u8 = 0x01;
/// The peer has the complete content.
pub const IS_COMPLETE: u8 = 0x02;
/// The peer is actively downloading.
pub const IS_DOWNLOADING: u8 = 0x04;
/// The peer's IPv6 endpoint passed a NAT check and is in the handout tables.
pub const IS_ROUTABLE_V6: u8 = 0x08;
/// The peer announced an IPv4 address.
pub const HAS_V4: u8 = 0x10;
/// The peer announced an IPv6 address.
pub const HAS_V6: u8 = 0x20;

/// A peer's status bitset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn has(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    pub fn set(&mut self, mask: u8) {
        self.0 |= mask;
    }

    pub fn clear(&mut self, mask: u8) {
        self.0 &= !mask;
    }
}

/// The partition a peer lives in. Endpoint storage and handout policy are
/// per category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Seeding = 0,
    Active = 1,
    Paused = 2,
}

pub const NUM_CATEGORIES: usize = 3;

impl Category {
    /// Checkpoint sampling and handout orderings rely on this order.
    pub const ALL: [Category; NUM_CATEGORIES] = [Category::Seeding, Category::Active, Category::Paused];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The state the tracker keeps for one peer of one swarm.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeerEntry {
    /// Unix seconds of the most recent announce.
    pub last_check_in: u64,
    pub status: Status,
    /// Index into the swarm's IPv4 endpoint table for `category()`, when
    /// `IS_ROUTABLE_V4` is set.
    pub ep_v4: Option<usize>,
    /// Index into the swarm's IPv6 endpoint table for `category()`, when
    /// `IS_ROUTABLE_V6` is set.
    pub ep_v6: Option<usize>,
}

impl PeerEntry {
    #[must_use]
    pub fn category(&self) -> Category {
        if self.status.has(IS_COMPLETE) {
            Category::Seeding
        } else if self.status.has(IS_DOWNLOADING) {
            Category::Active
        } else {
            Category::Paused
        }
    }

    /// Refreshes the check-in time and the completion/downloading bits from
    /// a client report. A seeding peer is never downloading.
    pub fn update_status(&mut self, now: u64, report: &ClientReport) {
        self.last_check_in = now;
        if report.left == 0 {
            self.status.set(IS_COMPLETE);
            self.status.clear(IS_DOWNLOADING);
        } else {
            self.status.clear(IS_COMPLETE);
            if report.event == AnnounceEvent::Paused {
                self.status.clear(IS_DOWNLOADING);
            } else {
                self.status.set(IS_DOWNLOADING);
            }
        }
    }
}
