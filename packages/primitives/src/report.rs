//! The transfer report a peer sends with every `announce` request.
use serde::Serialize;

use crate::announce_event::AnnounceEvent;

/// Counters reported by the client on each check-in. Everything except
/// `left` and `event` is aggregated into the swarm statistics and then
/// forgotten; nothing here is persisted per peer.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ClientReport {
    pub event: AnnounceEvent,
    /// Client-side timestamp of the check-in.
    pub t_checkin: u64,
    /// Bytes the peer still has to download. Zero marks a seeder.
    pub left: u64,
    /// Bytes downloaded from the web seed.
    pub w_downloaded: u64,
    /// Bytes downloaded from other peers.
    pub p_downloaded: u64,
    /// Bytes uploaded to other peers.
    pub p_uploaded: u64,
    /// Bytes of content verified by the client.
    pub c_bytes: u64,
    /// Web seed requests that returned bad data.
    pub w_bad: u64,
    /// Web seed requests that failed outright.
    pub w_fail: u64,
}

impl ClientReport {
    #[must_use]
    pub fn is_seeder(&self) -> bool {
        self.left == 0
    }
}
