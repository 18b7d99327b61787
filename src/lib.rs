//! **Helix Tracker** is a `BitTorrent` HTTP tracker built for large,
//! churning swarms.
//!
//! Peers in a swarm need to find each other. Each participant periodically
//! announces itself to the tracker and receives a subset of other peers'
//! endpoints in return. The tracker does not transfer file content; its job
//! is the efficient, correct maintenance of large per-swarm peer tables
//! under sustained request rates, with:
//!
//! - Dual-stack, category-partitioned peer tables with O(1) insertion and
//!   removal ([`core::swarm`]).
//! - Fair peer handout through a cursor with cross-category ratio caps
//!   ([`core::swarm::handout`]).
//! - NAT verification of claimed endpoints before they are advertised
//!   ([`core::natcheck`]).
//! - Durable flat-file snapshots of the swarm state ([`core::checkpoint`]).
//! - A runtime control surface over typed variables ([`core::control`]).
//! - An optional torrent blacklist fed from a relational store
//!   ([`core::blacklist`]).
//!
//! The delivery layer ([`servers::http`]) is an axum HTTP server speaking
//! the `BitTorrent` HTTP tracker protocol plus a small operational surface
//! (`/statistics`, `/control/...`).
pub mod app;
pub mod bootstrap;
pub mod core;
pub mod servers;

use helix_tracker_clock::clock;

/// This code needs to be copied into each crate.
/// Working version, for production.
#[cfg(not(test))]
pub type CurrentClock = clock::Working;

/// Stopped version, for testing.
#[cfg(test)]
pub type CurrentClock = clock::Stopped;
