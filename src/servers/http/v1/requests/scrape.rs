//! `Scrape` request for the HTTP tracker.
//!
//! A scrape may carry any number of `info_hash` params; each one is decoded
//! independently and malformed values fail the whole request.
use helix_tracker_primitives::info_hash::InfoHash;
use thiserror::Error;

use crate::servers::http::percent_encoding::percent_decode_info_hash;
use crate::servers::http::v1::query::Query;
use crate::servers::http::v1::responses;

const INFO_HASH: &str = "info_hash";

/// A fully parsed `scrape` request.
#[derive(Debug, PartialEq, Eq)]
pub struct Scrape {
    pub info_hashes: Vec<InfoHash>,
}

/// Errors that can occur when parsing the `Scrape` request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseScrapeError {
    #[error("invalid info_hash given.")]
    InvalidInfoHash,
}

impl From<ParseScrapeError> for responses::error::Error {
    fn from(err: ParseScrapeError) -> Self {
        responses::error::Error {
            failure_reason: err.to_string(),
        }
    }
}

impl TryFrom<&Query> for Scrape {
    type Error = ParseScrapeError;

    fn try_from(query: &Query) -> Result<Self, Self::Error> {
        // a scrape without any info_hash is answered with an empty files
        // dictionary
        let raw_hashes = query.get_param_vec(INFO_HASH).unwrap_or_default();

        let mut info_hashes = Vec::with_capacity(raw_hashes.len());
        for raw in &raw_hashes {
            let info_hash = percent_decode_info_hash(raw).map_err(|_| ParseScrapeError::InvalidInfoHash)?;
            info_hashes.push(info_hash);
        }

        Ok(Self { info_hashes })
    }
}
