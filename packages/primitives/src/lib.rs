//! Primitive types shared by the Helix tracker packages.
//!
//! These are the basic data structures of the swarm domain: torrent and peer
//! identifiers, announce events, the per-announce client report and the
//! aggregate swarm counters served by `scrape`.
use std::time::Duration;

pub mod announce_event;
pub mod info_hash;
pub mod peer;
pub mod report;
pub mod swarm_metadata;

/// Duration since the Unix Epoch. The tracker works with Unix timestamps.
pub type DurationSinceUnixEpoch = Duration;
