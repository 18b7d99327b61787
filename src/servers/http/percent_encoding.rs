//! Percent decoding for the binary query parameters.
//!
//! Infohashes and peer ids are percent encoded byte arrays, not UTF-8
//! strings, so they are decoded straight to bytes before conversion into the
//! domain types.
use helix_tracker_primitives::info_hash::{self, InfoHash};
use helix_tracker_primitives::peer;

/// Percent decodes a percent encoded infohash.
///
/// # Errors
///
/// Will return `Err` if the decoded bytes do not represent a valid
/// [`InfoHash`].
pub fn percent_decode_info_hash(raw_info_hash: &str) -> Result<InfoHash, info_hash::ConversionError> {
    let bytes = percent_encoding::percent_decode_str(raw_info_hash).collect::<Vec<u8>>();
    InfoHash::try_from(bytes)
}

/// Percent decodes a percent encoded peer id.
///
/// # Errors
///
/// Will return `Err` if the decoded bytes do not represent a valid
/// [`peer::Id`].
pub fn percent_decode_peer_id(raw_peer_id: &str) -> Result<peer::Id, peer::IdConversionError> {
    let bytes = percent_encoding::percent_decode_str(raw_peer_id).collect::<Vec<u8>>();
    peer::Id::try_from(bytes)
}

/// Percent decodes an arbitrary parameter to raw bytes.
#[must_use]
pub fn percent_decode_bytes(raw: &str) -> Vec<u8> {
    percent_encoding::percent_decode_str(raw).collect()
}
