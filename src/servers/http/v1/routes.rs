//! HTTP server routes for version `v1`.
use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;

use super::handlers::{announce, control, scrape, statistics};
use crate::core::Tracker;

/// It adds the routes to the router.
///
/// The remote address reaches the handlers through the connection info
/// extension; the server must be built with
/// `into_make_service_with_connect_info`.
#[must_use]
pub fn router(tracker: Arc<Tracker>) -> Router {
    Router::new()
        // Tracker protocol
        .route("/announce", get(announce::handle))
        .route("/scrape", get(scrape::handle))
        // Operational surface
        .route("/statistics", get(statistics::handle))
        .route("/control", get(control::get_controls))
        .route("/control/set", put(control::set_controls))
        .route("/control/blacklist", get(control::get_blacklist).put(control::set_blacklist))
        .route(
            "/control/flags/:info_hash",
            get(control::get_swarm_flags).put(control::set_swarm_flags),
        )
        .with_state(tracker)
}
