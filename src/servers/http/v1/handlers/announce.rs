//! Axum handler for the `announce` request.
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use tracing::debug;

use super::tracker_context;
use crate::core::Tracker;
use crate::servers::http::v1::extractors::announce_request::ExtractRequest;
use crate::servers::http::v1::extractors::client_ip_sources::Extract as ExtractClientIpSources;
use crate::servers::http::v1::responses::bencoded_response;
use crate::servers::http::v1::services;

/// It handles the `announce` request.
pub async fn handle(
    State(tracker): State<Arc<Tracker>>,
    ExtractRequest(announce_request): ExtractRequest,
    ExtractClientIpSources(client_ip_sources): ExtractClientIpSources,
) -> Response {
    debug!("http announce request: {:#?}", announce_request);

    let reply = services::announce::invoke(&tracker, announce_request, &client_ip_sources).await;

    let context = tracker_context(&tracker, reply.swarm);
    bencoded_response(reply.body, &context)
}
