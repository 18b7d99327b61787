//! `Error` response for the HTTP tracker.
//!
//! From [BEP 03. The `BitTorrent` Protocol Specification](https://www.bittorrent.org/beps/bep_0003.html):
//!
//! _"Tracker responses are bencoded dictionaries. If a tracker response has a
//! key failure reason, then that maps to a human readable string which
//! explains why the query failed, and no other keys are required."_
//!
//! Error responses are bencoded and always have a `200 OK` status code.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::core::error::Error as CoreError;
use crate::core::swarm::AnnounceRejection;

/// `Error` response for the HTTP tracker.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Error {
    /// Human readable string which explains why the request failed.
    #[serde(rename = "failure reason")]
    pub failure_reason: String,
}

impl Error {
    /// Returns the bencoded representation of the `Error` struct.
    ///
    /// # Panics
    ///
    /// It would panic if the `Error` struct contained an inappropriate field
    /// type.
    #[must_use]
    pub fn write(&self) -> String {
        serde_bencode::to_string(&self).expect("a failure reason is always bencodable")
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        Self {
            failure_reason: err.to_string(),
        }
    }
}

impl From<AnnounceRejection> for Error {
    fn from(err: AnnounceRejection) -> Self {
        Self {
            failure_reason: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (StatusCode::OK, self.write()).into_response()
    }
}

#[cfg(test)]
mod tests {

    use super::Error;

    #[test]
    fn http_tracker_errors_can_be_bencoded() {
        let err = Error {
            failure_reason: "error message".to_owned(),
        };

        assert_eq!(err.write(), "d14:failure reason13:error messagee"); // cspell:disable-line
    }

    #[test]
    fn rejections_map_to_the_exact_failure_reasons() {
        use crate::core::swarm::AnnounceRejection;

        assert_eq!(
            Error::from(AnnounceRejection::CheckinTooEarly).failure_reason,
            "Client checked in too early."
        );
        assert_eq!(
            Error::from(AnnounceRejection::PermissionDenied).failure_reason,
            "Permission denied."
        );
    }
}
