//! Axum handler for the `/statistics` text dump.
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::core::Tracker;
use crate::servers::http::v1::responses::text_response;

/// It handles the `/statistics` request.
pub async fn handle(State(tracker): State<Arc<Tracker>>) -> Response {
    let report = tracker.statistics_report().await;

    text_response(report, &tracker.tracker_id)
}
