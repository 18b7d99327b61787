//! HTTP responses for the HTTP tracker.
//!
//! Every tracker reply, including failures, is an HTTP `200 OK` whose body
//! is bencoded. The helpers here attach the operational headers: the tracker
//! instance id, the sampled CPU usage and, when a swarm context exists, the
//! swarm's load rank and CPU share.
pub mod announce;
pub mod error;
pub mod scrape;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;

/// Per-swarm values for the `X-Swarm-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct SwarmContext {
    pub rank: usize,
    pub cpu_load: f64,
}

/// Per-tracker values for the response headers.
#[derive(Debug, Clone)]
pub struct TrackerContext {
    pub server_id: String,
    pub cpu_percent: f64,
    pub swarm: Option<SwarmContext>,
}

/// A bencoded `200 OK` with the tracker headers.
#[must_use]
pub fn bencoded_response(body: Vec<u8>, context: &TrackerContext) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .header("X-Server", context.server_id.clone())
        .header("X-CPU", format!("{:.2}", context.cpu_percent));

    if let Some(swarm) = &context.swarm {
        builder = builder
            .header("X-Swarm-CPU", format!("{:.2}", swarm.cpu_load))
            .header("X-Swarm-Rank", swarm.rank.to_string());
    }

    builder.body(Body::from(body)).expect("the response headers are valid")
}

/// A plain text `200 OK` with the tracker id header.
#[must_use]
pub fn text_response(content: String, server_id: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .header("X-Server", server_id.to_string())
        .body(Body::from(content))
        .expect("the response headers are valid")
}
