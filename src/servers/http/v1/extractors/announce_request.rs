//! Axum extractor for the announce request.
//!
//! It parses the query parameters, rejecting the request with a bencoded
//! failure (still HTTP `200 OK`) when they are missing or invalid.
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::servers::http::v1::query::Query;
use crate::servers::http::v1::requests::announce::Announce;
use crate::servers::http::v1::responses;

/// Extractor for the announce request.
pub struct ExtractRequest(pub Announce);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match extract_announce_from(parts.uri.query()) {
            Ok(announce_request) => Ok(ExtractRequest(announce_request)),
            Err(error) => Err(error.into_response()),
        }
    }
}

fn extract_announce_from(maybe_raw_query: Option<&str>) -> Result<Announce, responses::error::Error> {
    let query = maybe_raw_query
        .unwrap_or_default()
        .parse::<Query>()
        .map_err(|_| responses::error::Error {
            failure_reason: "error handling request".to_string(),
        })?;

    Announce::try_from(&query).map_err(responses::error::Error::from)
}
