//! Axum handlers for the HTTP tracker endpoints.
use std::sync::Arc;

use super::responses::{SwarmContext, TrackerContext};
use crate::core::Tracker;

pub mod announce;
pub mod control;
pub mod scrape;
pub mod statistics;

/// The header values every tracker response carries.
#[must_use]
pub fn tracker_context(tracker: &Arc<Tracker>, swarm: Option<SwarmContext>) -> TrackerContext {
    TrackerContext {
        server_id: tracker.tracker_id.clone(),
        cpu_percent: tracker.cpu.get(),
        swarm,
    }
}
