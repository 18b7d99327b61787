//! Axum handler for the `scrape` request.
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use tracing::debug;

use super::tracker_context;
use crate::core::Tracker;
use crate::servers::http::v1::extractors::client_ip_sources::Extract as ExtractClientIpSources;
use crate::servers::http::v1::extractors::scrape_request::ExtractRequest;
use crate::servers::http::v1::responses::{bencoded_response, scrape::Bencoded};
use crate::servers::http::v1::services;

/// It handles the `scrape` request.
pub async fn handle(
    State(tracker): State<Arc<Tracker>>,
    ExtractRequest(scrape_request): ExtractRequest,
    ExtractClientIpSources(client_ip_sources): ExtractClientIpSources,
) -> Response {
    debug!("http scrape request: {:#?}", scrape_request);

    let client_ip = client_ip_sources.header_ip.or(client_ip_sources.connection_ip);
    let scrape_data = services::scrape::invoke(&tracker, scrape_request, client_ip).await;

    let context = tracker_context(&tracker, None);
    bencoded_response(Bencoded::from(scrape_data).body(), &context)
}
