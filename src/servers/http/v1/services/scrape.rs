//! The `scrape` application service.
use std::net::IpAddr;
use std::sync::Arc;

use crate::core::statistics::Event;
use crate::core::{ScrapeData, Tracker};
use crate::servers::http::v1::requests::scrape::Scrape;

/// Handles one scrape request: an entry for every queried info hash the
/// tracker knows, unknown ones omitted.
pub async fn invoke(tracker: &Arc<Tracker>, scrape: Scrape, client_ip: Option<IpAddr>) -> ScrapeData {
    match client_ip {
        Some(IpAddr::V6(_)) => tracker.send_stats_event(Event::Tcp6Scrape).await,
        _ => tracker.send_stats_event(Event::Tcp4Scrape).await,
    }

    tracker.scrape(&scrape.info_hashes)
}
