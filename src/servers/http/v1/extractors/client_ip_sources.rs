//! Axum extractor for the sources the peer address can be resolved from.
//!
//! The connection's remote address is the default. A proxy (or the client
//! itself) may override it with an `x-forwarded-for` or `clientipaddr`
//! header carrying a single IP literal; unparsable header values are
//! ignored.
use std::net::{IpAddr, SocketAddr};

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::response::Response;

use crate::servers::http::v1::services::peer_ip_resolver::ClientIpSources;

const FORWARDED_HEADERS: [&str; 2] = ["x-forwarded-for", "clientipaddr"];

/// Extractor for the [`ClientIpSources`].
pub struct Extract(pub ClientIpSources);

#[async_trait]
impl<S> FromRequestParts<S> for Extract
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_ip = FORWARDED_HEADERS.iter().find_map(|name| {
            parts
                .headers
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        });

        let connection_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|connect_info| connect_info.0.ip());

        Ok(Extract(ClientIpSources {
            header_ip,
            connection_ip,
        }))
    }
}
