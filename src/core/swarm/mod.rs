//! Our view of one swarm we are tracking.
//!
//! A swarm owns a peer map keyed by `peer_id` and, for each category
//! (seeding, active, paused) and address family, a packed endpoint table used
//! for handouts. Peers enter the endpoint tables only after a NAT check
//! confirmed their claimed endpoint is reachable; until then they are tracked
//! but never handed out.
pub mod endpoints;
pub mod handout;
pub mod peer;
pub mod stats;

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use helix_tracker_primitives::announce_event::AnnounceEvent;
use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::peer::Id;
use helix_tracker_primitives::report::ClientReport;
use helix_tracker_primitives::swarm_metadata::SwarmMetadata;
use thiserror::Error;

use self::endpoints::{CompactV4, CompactV6, EndpointTable};
use self::handout::Strategy;
use self::peer::{Category, PeerEntry, Status, HAS_V4, HAS_V6, IS_COMPLETE, IS_ROUTABLE_V4, IS_ROUTABLE_V6, NUM_CATEGORIES};
use self::stats::SwarmStats;

/// Seconds a client should wait between regular announces.
pub const INTERVAL: u64 = 30 * 60;
/// Width of the uniform jitter applied to the announced interval.
pub const INTERVAL_RANDOM: u64 = 5 * 60;
/// Clients must not announce more often than this.
pub const MIN_INTERVAL: u64 = 15 * 60;
/// Interval clients use to align their statistics snapshots.
pub const SNAP_DELTA: u64 = 5 * 60;

/// The swarm does not accept announces.
pub const FLAG_DISABLED: u32 = 0x1;
/// Only peer ids with the configured prefix may join.
pub const FLAG_DNA_ONLY: u32 = 0x2;
/// Announces are answered with a request to terminate the swarm.
pub const FLAG_TERMINATE: u32 = 0x4;

const FLAG_NAMES: [(u32, &str); 3] = [
    (FLAG_DISABLED, "disabled"),
    (FLAG_DNA_ONLY, "dna_only"),
    (FLAG_TERMINATE, "terminate"),
];

/// The address family of an endpoint table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// A snapshot of the runtime knobs that shape one announce.
#[derive(Clone, Debug)]
pub struct AnnouncePolicy {
    pub min_interval: u64,
    /// Upper limit on how many times a single endpoint is handed out per
    /// announce interval.
    pub max_handouts: i64,
    pub enforce_dna_only: bool,
    pub dna_only_prefix: Vec<u8>,
    pub strategy: Strategy,
}

impl Default for AnnouncePolicy {
    fn default() -> Self {
        Self {
            min_interval: MIN_INTERVAL,
            max_handouts: 50,
            enforce_dna_only: false,
            dna_only_prefix: b"DNA".to_vec(),
            strategy: Strategy::Sequential,
        }
    }
}

/// Why an announce was turned away. The display form is the exact
/// `failure reason` sent to the client.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnnounceRejection {
    #[error("Permission denied.")]
    PermissionDenied,
    #[error("Client checked in too early.")]
    CheckinTooEarly,
}

/// What one announce did to the swarm, plus the packed peer lists to return.
#[derive(Debug, Default)]
pub struct AnnounceOutcome {
    pub peers: Vec<u8>,
    pub peers6: Vec<u8>,
    /// A new peer entry was created.
    pub created: bool,
    /// Endpoints emitted into `peers` and `peers6` together.
    pub delivered: usize,
    /// Claimed endpoints that need a NAT check before they can be handed out.
    pub nat_checks: Vec<SocketAddr>,
}

/// The tracked state of one swarm.
pub struct Swarm {
    info_hash: InfoHash,
    peers: HashMap<Id, PeerEntry>,
    v4: [EndpointTable<CompactV4>; NUM_CATEGORIES],
    v6: [EndpointTable<CompactV6>; NUM_CATEGORIES],
    peer_counts: [usize; NUM_CATEGORIES],
    v4_counts: [usize; NUM_CATEGORIES],
    v6_counts: [usize; NUM_CATEGORIES],
    stats: SwarmStats,
    flags: u32,
    rank: usize,
    cpu_load: f64,
}

impl Swarm {
    #[must_use]
    pub fn new(info_hash: InfoHash, dna_only: bool) -> Self {
        Self {
            info_hash,
            peers: HashMap::new(),
            v4: Default::default(),
            v6: Default::default(),
            peer_counts: [0; NUM_CATEGORIES],
            v4_counts: [0; NUM_CATEGORIES],
            v6_counts: [0; NUM_CATEGORIES],
            stats: SwarmStats::default(),
            flags: if dna_only { FLAG_DNA_ONLY } else { 0 },
            rank: usize::MAX,
            cpu_load: 0.0,
        }
    }

    #[must_use]
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Handles one announce after the delivery layer has parsed and resolved
    /// everything. `v4`/`v6` are the peer's claimed addresses per family,
    /// with the port each family would listen on.
    ///
    /// # Errors
    ///
    /// Returns an [`AnnounceRejection`] whose display form is the
    /// `failure reason` for the client.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_announce(
        &mut self,
        peer_id: Id,
        v4: Option<Ipv4Addr>,
        port4: u16,
        v6: Option<Ipv6Addr>,
        port6: u16,
        numwant: u16,
        report: &ClientReport,
        client_debug: bool,
        policy: &AnnouncePolicy,
        now: u64,
    ) -> Result<AnnounceOutcome, AnnounceRejection> {
        if !self.peer_permitted(&peer_id, policy) {
            return Err(AnnounceRejection::PermissionDenied);
        }

        self.stats.log_request(report);

        // stopped event should not return peers
        let numwant = if report.event == AnnounceEvent::Stopped { 0 } else { numwant };

        let category = if report.left == 0 {
            Category::Seeding
        } else if report.event == AnnounceEvent::Paused {
            Category::Paused
        } else {
            Category::Active
        };

        let mut outcome = AnnounceOutcome::default();
        let known = self.peers.contains_key(&peer_id);
        let ports_usable = port4 != 0 || port6 != 0;

        if ports_usable {
            if report.event == AnnounceEvent::Stopped {
                if known {
                    self.remove_peer(&peer_id);
                }
            } else if known {
                self.update_peer(peer_id, v4, port4, v6, port6, report, client_debug, policy, now, &mut outcome)?;
            } else {
                self.add_peer(peer_id, v4.is_some(), v6.is_some(), report, now);
                outcome.created = true;
                if let Some(ip) = v4 {
                    outcome.nat_checks.push(SocketAddr::new(ip.into(), port4));
                }
                if let Some(ip) = v6 {
                    outcome.nat_checks.push(SocketAddr::new(ip.into(), port6));
                }
            }
        } else {
            tracing::debug!("port = 0 rejected");
        }

        // an unregistrable stranger (port 0, never seen) gets nothing back
        if ports_usable || known {
            if v4.is_some() {
                let mut peers = std::mem::take(&mut outcome.peers);
                outcome.delivered += self.get_peers(&mut peers, numwant, category, Family::V4, policy);
                outcome.peers = peers;
            }
            if v6.is_some() {
                let mut peers6 = std::mem::take(&mut outcome.peers6);
                outcome.delivered += self.get_peers(&mut peers6, numwant, category, Family::V6, policy);
                outcome.peers6 = peers6;
            }
        }

        debug_assert!(self.invariant_holds());

        Ok(outcome)
    }

    fn peer_permitted(&self, peer_id: &Id, policy: &AnnouncePolicy) -> bool {
        if !policy.enforce_dna_only {
            return true;
        }
        if self.flags & FLAG_DNA_ONLY == 0 {
            return true;
        }
        peer_id.starts_with(&policy.dna_only_prefix)
    }

    fn add_peer(&mut self, peer_id: Id, has_v4: bool, has_v6: bool, report: &ClientReport, now: u64) {
        let mut entry = PeerEntry::default();

        if report.left == 0 {
            entry.status.set(IS_COMPLETE);
            self.stats.update_peer_counts(0, 1);
        } else {
            self.stats.update_peer_counts(1, 0);
        }

        entry.update_status(now, report);

        let category = entry.category();
        self.peer_counts[category.index()] += 1;
        if has_v4 {
            self.v4_counts[category.index()] += 1;
            entry.status.set(HAS_V4);
        }
        if has_v6 {
            self.v6_counts[category.index()] += 1;
            entry.status.set(HAS_V6);
        }

        self.peers.insert(peer_id, entry);
    }

    #[allow(clippy::too_many_arguments)]
    fn update_peer(
        &mut self,
        peer_id: Id,
        v4: Option<Ipv4Addr>,
        port4: u16,
        v6: Option<Ipv6Addr>,
        port6: u16,
        report: &ClientReport,
        client_debug: bool,
        policy: &AnnouncePolicy,
        now: u64,
        outcome: &mut AnnounceOutcome,
    ) -> Result<(), AnnounceRejection> {
        let Some(mut entry) = self.peers.get(&peer_id).copied() else {
            return Ok(());
        };
        let old_category = entry.category();

        let mut grant_exception = client_debug;

        // a peer that just completed needs to change state right away
        if !entry.status.has(IS_COMPLETE) && report.event == AnnounceEvent::Completed {
            grant_exception = true;
        }

        // While the swarm has almost no routable peers, let anyone announce
        // early. A publisher that joined before the only routable seeder has
        // to re-announce to ever learn about it.
        if self.routable_transfer_endpoints() <= 2 {
            grant_exception = true;
        }

        if peer_id.is_load_tester() {
            grant_exception = true;
        }

        if !grant_exception && now.saturating_sub(entry.last_check_in) < policy.min_interval {
            return Err(AnnounceRejection::CheckinTooEarly);
        }

        // an endpoint the peer did not use to have gets a NAT check
        if let Some(ip) = v4 {
            if !entry.status.has(HAS_V4) {
                self.v4_counts[old_category.index()] += 1;
                entry.status.set(HAS_V4);
                outcome.nat_checks.push(SocketAddr::new(ip.into(), port4));
            }
        }
        if let Some(ip) = v6 {
            if !entry.status.has(HAS_V6) {
                self.v6_counts[old_category.index()] += 1;
                entry.status.set(HAS_V6);
                outcome.nat_checks.push(SocketAddr::new(ip.into(), port6));
            }
        }

        entry.update_status(now, report);
        let new_category = entry.category();

        if new_category != old_category {
            self.peer_counts[old_category.index()] -= 1;
            self.peer_counts[new_category.index()] += 1;
            if entry.status.has(HAS_V4) {
                self.v4_counts[old_category.index()] -= 1;
                self.v4_counts[new_category.index()] += 1;
            }
            if entry.status.has(HAS_V6) {
                self.v6_counts[old_category.index()] -= 1;
                self.v6_counts[new_category.index()] += 1;
            }

            // move the endpoints from the old lists to the new ones
            if entry.status.has(IS_ROUTABLE_V4) {
                if let Some(index) = entry.ep_v4 {
                    let record = *self.v4[old_category.index()].record(index);
                    self.remove_endpoint_v4(old_category, index);
                    entry.ep_v4 = Some(self.v4[new_category.index()].push(record, peer_id));
                }
            }
            if entry.status.has(IS_ROUTABLE_V6) {
                if let Some(index) = entry.ep_v6 {
                    let record = *self.v6[old_category.index()].record(index);
                    self.remove_endpoint_v6(old_category, index);
                    entry.ep_v6 = Some(self.v6[new_category.index()].push(record, peer_id));
                }
            }

            if new_category == Category::Seeding {
                self.stats.update_peer_counts(-1, 1);
            } else if old_category == Category::Seeding {
                self.stats.update_peer_counts(1, -1);
            }
        }

        // refresh the stored endpoint with whatever the peer claims now
        if entry.status.has(IS_ROUTABLE_V4) {
            if let (Some(index), Some(ip)) = (entry.ep_v4, v4) {
                *self.v4[new_category.index()].record_mut(index) = CompactV4::new(ip, port4);
            }
        }
        if entry.status.has(IS_ROUTABLE_V6) {
            if let (Some(index), Some(ip)) = (entry.ep_v6, v6) {
                *self.v6[new_category.index()].record_mut(index) = CompactV6::new(ip, port6);
            }
        }

        self.peers.insert(peer_id, entry);
        Ok(())
    }

    /// Routable endpoints of peers that are transferring (active or seeding),
    /// both families. Used by the min-interval exception.
    fn routable_transfer_endpoints(&self) -> usize {
        self.v4[Category::Active.index()].len()
            + self.v4[Category::Seeding.index()].len()
            + self.v6[Category::Active.index()].len()
            + self.v6[Category::Seeding.index()].len()
    }

    /// Makes a NAT-checked endpoint visible in the handout tables.
    /// Idempotent per family: late duplicate check results are dropped.
    pub fn add_peer_endpoint(&mut self, peer_id: &Id, addr: SocketAddr) {
        let Some(mut entry) = self.peers.get(peer_id).copied() else {
            return;
        };

        // multiple pending NAT checks can complete if the peer stops and
        // restarts quickly; later successes are dropped here
        match addr {
            SocketAddr::V4(v4_addr) => {
                if entry.status.has(IS_ROUTABLE_V4) {
                    return;
                }
                let category = entry.category();
                let index = self.v4[category.index()].push(CompactV4::new(*v4_addr.ip(), v4_addr.port()), *peer_id);
                entry.ep_v4 = Some(index);
                entry.status.set(IS_ROUTABLE_V4);
            }
            SocketAddr::V6(v6_addr) => {
                if entry.status.has(IS_ROUTABLE_V6) {
                    return;
                }
                let category = entry.category();
                let index = self.v6[category.index()].push(CompactV6::new(*v6_addr.ip(), v6_addr.port()), *peer_id);
                entry.ep_v6 = Some(index);
                entry.status.set(IS_ROUTABLE_V6);
            }
        }

        self.peers.insert(*peer_id, entry);
        debug_assert!(self.invariant_holds());
    }

    fn remove_peer(&mut self, peer_id: &Id) {
        let Some(entry) = self.peers.remove(peer_id) else {
            return;
        };
        let category = entry.category();

        if entry.status.has(IS_ROUTABLE_V4) {
            if let Some(index) = entry.ep_v4 {
                self.remove_endpoint_v4(category, index);
            }
        }
        if entry.status.has(IS_ROUTABLE_V6) {
            if let Some(index) = entry.ep_v6 {
                self.remove_endpoint_v6(category, index);
            }
        }

        self.peer_counts[category.index()] -= 1;
        if entry.status.has(HAS_V4) {
            self.v4_counts[category.index()] -= 1;
        }
        if entry.status.has(HAS_V6) {
            self.v6_counts[category.index()] -= 1;
        }

        if entry.status.has(IS_COMPLETE) {
            self.stats.update_peer_counts(0, -1);
        } else {
            self.stats.update_peer_counts(-1, 0);
        }

        debug_assert!(self.invariant_holds());
    }

    fn remove_endpoint_v4(&mut self, category: Category, index: usize) {
        if let Some(moved_owner) = self.v4[category.index()].swap_remove(index) {
            if let Some(moved) = self.peers.get_mut(&moved_owner) {
                moved.ep_v4 = Some(index);
            }
        }
    }

    fn remove_endpoint_v6(&mut self, category: Category, index: usize) {
        if let Some(moved_owner) = self.v6[category.index()].swap_remove(index) {
            if let Some(moved) = self.peers.get_mut(&moved_owner) {
                moved.ep_v6 = Some(index);
            }
        }
    }

    /// How many endpoints of `source` one requester from `requester` may
    /// receive per announce. Avoids handing seeds out too many times to
    /// downloaders and downloaders to too many seeds.
    #[allow(clippy::cast_precision_loss)]
    fn handout_ratio(&self, source: Category, requester: Category, family: Family, max_handouts: i64) -> f64 {
        let (source_len, requester_count) = match family {
            Family::V4 => (self.v4[source.index()].len(), self.v4_counts[requester.index()]),
            Family::V6 => (self.v6[source.index()].len(), self.v6_counts[requester.index()]),
        };
        if requester_count == 0 {
            return max_handouts as f64;
        }
        max_handouts as f64 * source_len as f64 / requester_count as f64
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn collect(&mut self, out: &mut Vec<u8>, count: f64, source: Category, family: Family, strategy: Strategy) -> usize {
        match (family, strategy) {
            (Family::V4, Strategy::Sequential) => self.v4[source.index()].sequential(count, out),
            (Family::V4, Strategy::Random) => self.v4[source.index()].random(count as usize, &mut rand::thread_rng(), out),
            (Family::V6, Strategy::Sequential) => self.v6[source.index()].sequential(count, out),
            (Family::V6, Strategy::Random) => self.v6[source.index()].random(count as usize, &mut rand::thread_rng(), out),
        }
    }

    /// Emits up to `want` packed endpoints for a requester of the given
    /// category, drawing from the other categories according to the handout
    /// policy. Returns the number of endpoints emitted.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_peers(&mut self, out: &mut Vec<u8>, want: u16, requester: Category, family: Family, policy: &AnnouncePolicy) -> usize {
        let mut count = f64::from(want);
        let mut emitted = 0;

        match requester {
            Category::Active => {
                // active peers can receive peers from all categories, with a
                // ratio cap on seeds and a bias against paused peers
                let cap = self.handout_ratio(Category::Seeding, Category::Active, family, policy.max_handouts);
                let n = self.collect(out, count.min(cap), Category::Seeding, family, policy.strategy);
                emitted += n;
                count -= n as f64;
                if count > 0.0 {
                    let n = self.collect(out, count, Category::Active, family, policy.strategy);
                    emitted += n;
                    count -= n as f64;
                }
                if count > 0.0 {
                    emitted += self.collect(out, count, Category::Paused, family, policy.strategy);
                }
            }
            Category::Paused => {
                let cap = self.handout_ratio(Category::Active, Category::Paused, family, policy.max_handouts);
                emitted += self.collect(out, count.min(cap), Category::Active, family, policy.strategy);
            }
            Category::Seeding => {
                let cap = self.handout_ratio(Category::Active, Category::Seeding, family, policy.max_handouts);
                emitted += self.collect(out, count.min(cap), Category::Active, family, policy.strategy);
            }
        }

        emitted
    }

    /// Removes every peer whose last check-in is older than `max_age`
    /// seconds. Returns how many were evicted.
    pub fn timeout_peers(&mut self, now: u64, max_age: u64) -> usize {
        let expired: Vec<Id> = self
            .peers
            .iter()
            .filter(|(_, entry)| now.saturating_sub(entry.last_check_in) > max_age)
            .map(|(id, _)| *id)
            .collect();

        for peer_id in &expired {
            self.remove_peer(peer_id);
            self.stats.add_timeout();
        }

        expired.len()
    }

    // flags

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.flags & FLAG_DISABLED != 0
    }

    pub fn disable(&mut self) {
        self.flags |= FLAG_DISABLED;
    }

    pub fn enable(&mut self) {
        self.flags &= !FLAG_DISABLED;
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.flags & FLAG_TERMINATE != 0
    }

    fn flag_name(flag: u32) -> String {
        for (bit, name) in FLAG_NAMES {
            if bit == flag {
                return (*name).to_string();
            }
        }
        format!("{flag:#x}")
    }

    fn flag_from_name(name: &str) -> Option<u32> {
        FLAG_NAMES.iter().find(|(_, n)| *n == name).map(|(bit, _)| *bit)
    }

    /// The set flags as a comma separated list of names.
    #[must_use]
    pub fn flags_string(&self) -> String {
        let mut names = Vec::new();
        let mut remaining = self.flags;
        while remaining != 0 {
            let flag = remaining & remaining.wrapping_neg();
            names.push(Self::flag_name(flag));
            remaining &= remaining - 1;
        }
        names.join(",")
    }

    /// Sets or clears the named flags.
    ///
    /// # Errors
    ///
    /// Fails on the first unknown flag name, leaving all flags unchanged.
    pub fn set_flags(&mut self, assignments: &[(String, bool)]) -> Result<(), UnknownFlag> {
        let mut new_flags = self.flags;
        for (name, value) in assignments {
            let Some(flag) = Self::flag_from_name(name) else {
                return Err(UnknownFlag { name: name.clone() });
            };
            if *value {
                new_flags |= flag;
            } else {
                new_flags &= !flag;
            }
        }
        self.flags = new_flags;
        Ok(())
    }

    // counters

    /// Incomplete peers (active and paused).
    #[must_use]
    pub fn num_peers(&self) -> usize {
        self.peer_counts[Category::Active.index()] + self.peer_counts[Category::Paused.index()]
    }

    #[must_use]
    pub fn num_downloaders(&self) -> usize {
        self.peer_counts[Category::Active.index()]
    }

    #[must_use]
    pub fn num_paused(&self) -> usize {
        self.peer_counts[Category::Paused.index()]
    }

    #[must_use]
    pub fn num_seeds(&self) -> usize {
        self.peer_counts[Category::Seeding.index()]
    }

    #[must_use]
    pub fn num_completes(&self) -> u64 {
        self.stats.completes
    }

    #[must_use]
    pub fn w_bad(&self) -> u64 {
        self.stats.w_bad
    }

    #[must_use]
    pub fn cumulative_w_bad(&self) -> u64 {
        self.stats.cumulative_w_bad
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn metadata(&self) -> SwarmMetadata {
        SwarmMetadata {
            complete: self.num_seeds() as u32,
            incomplete: self.num_peers() as u32,
            downloaded: self.num_completes() as u32,
            downloaders: self.num_downloaders() as u32,
        }
    }

    /// A load metric comparable to other swarms. First guess is the number
    /// of peers, including non-routable ones.
    #[must_use]
    pub fn load_metric(&self) -> usize {
        self.peers.len()
    }

    pub fn set_rank(&mut self, rank: usize) {
        self.rank = rank;
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn set_cpu_load(&mut self, cpu_load: f64) {
        self.cpu_load = cpu_load;
    }

    #[must_use]
    pub fn cpu_load(&self) -> f64 {
        self.cpu_load
    }

    // checkpoint support

    /// Samples up to `cap` routable IPv4 peers in category order (seeding,
    /// active, paused) for a checkpoint.
    #[must_use]
    pub fn snapshot_peers(&self, cap: usize) -> Vec<(Id, PeerEntry, CompactV4)> {
        let mut sampled = Vec::new();
        for category in Category::ALL {
            for (record, owner) in self.v4[category.index()].iter() {
                if sampled.len() == cap {
                    return sampled;
                }
                if let Some(entry) = self.peers.get(owner) {
                    sampled.push((*owner, *entry, *record));
                }
            }
        }
        sampled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Re-inserts a peer from a checkpoint record. IPv6 state is never
    /// persisted, so the v6 bits are cleared. Returns `false` for records
    /// that cannot have come from a checkpoint (non-routable peers), which
    /// the loader treats as corruption.
    pub fn restore_peer(&mut self, peer_id: Id, last_check_in: u64, status_bits: u8, endpoint: CompactV4) -> bool {
        let mut status = Status::from_bits(status_bits);
        status.set(HAS_V4);
        status.clear(IS_ROUTABLE_V6);
        status.clear(HAS_V6);

        if !status.has(IS_ROUTABLE_V4) {
            return false;
        }

        if status.has(IS_COMPLETE) {
            self.stats.update_peer_counts(0, 1);
        } else {
            self.stats.update_peer_counts(1, 0);
        }

        let mut entry = PeerEntry {
            last_check_in,
            status,
            ep_v4: None,
            ep_v6: None,
        };
        let category = entry.category();
        self.v4_counts[category.index()] += 1;
        self.peer_counts[category.index()] += 1;
        entry.ep_v4 = Some(self.v4[category.index()].push(endpoint, peer_id));
        self.peers.insert(peer_id, entry);

        debug_assert!(self.invariant_holds());
        true
    }

    #[cfg(test)]
    #[must_use]
    pub fn peer(&self, peer_id: &Id) -> Option<&PeerEntry> {
        self.peers.get(peer_id)
    }

    #[cfg(test)]
    #[must_use]
    pub fn endpoint_count(&self, category: Category, family: Family) -> usize {
        match family {
            Family::V4 => self.v4[category.index()].len(),
            Family::V6 => self.v6[category.index()].len(),
        }
    }

    /// Structural soundness of the swarm: parallel vectors agree, every
    /// routable peer's back-index points at its own endpoint slot, and the
    /// per-category counts add up.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        let mut num_complete = 0;
        let mut num_downloading = 0;
        let mut num_incomplete = 0;

        for (peer_id, entry) in &self.peers {
            let category = entry.category();
            if entry.status.has(IS_ROUTABLE_V4) {
                let Some(index) = entry.ep_v4 else { return false };
                let table = &self.v4[category.index()];
                if index >= table.len() || table.owner(index) != *peer_id {
                    return false;
                }
            }
            if entry.status.has(IS_ROUTABLE_V6) {
                let Some(index) = entry.ep_v6 else { return false };
                let table = &self.v6[category.index()];
                if index >= table.len() || table.owner(index) != *peer_id {
                    return false;
                }
            }
            if entry.status.has(IS_COMPLETE) {
                num_complete += 1;
                if entry.status.has(peer::IS_DOWNLOADING) {
                    return false;
                }
            } else {
                num_incomplete += 1;
                if entry.status.has(peer::IS_DOWNLOADING) {
                    num_downloading += 1;
                }
            }
        }

        self.peer_counts.iter().sum::<usize>() == self.peers.len()
            && self.num_peers() == num_incomplete
            && self.num_downloaders() == num_downloading
            && self.num_seeds() == num_complete
    }
}

/// Error for a flag name the tracker does not know.
#[derive(Error, Debug)]
#[error("No such flag '{name}'.")]
pub struct UnknownFlag {
    pub name: String,
}
