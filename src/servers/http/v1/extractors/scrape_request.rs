//! Axum extractor for the scrape request.
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::servers::http::v1::query::Query;
use crate::servers::http::v1::requests::scrape::Scrape;
use crate::servers::http::v1::responses;

/// Extractor for the scrape request.
pub struct ExtractRequest(pub Scrape);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match extract_scrape_from(parts.uri.query()) {
            Ok(scrape_request) => Ok(ExtractRequest(scrape_request)),
            Err(error) => Err(error.into_response()),
        }
    }
}

fn extract_scrape_from(maybe_raw_query: Option<&str>) -> Result<Scrape, responses::error::Error> {
    let query = maybe_raw_query
        .unwrap_or_default()
        .parse::<Query>()
        .map_err(|_| responses::error::Error {
            failure_reason: "error handling request".to_string(),
        })?;

    Scrape::try_from(&query).map_err(responses::error::Error::from)
}
