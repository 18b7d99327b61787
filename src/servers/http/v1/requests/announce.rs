//! `Announce` request for the HTTP tracker.
//!
//! Parses the query parameters into domain types, preserving the tracker's
//! lenient numeric rules: the transfer report numerics fall back to zero on
//! garbage, a minus-prefixed `left` falls back to the historical "just a bit
//! left" value, and only malformed identifiers or events fail the request.
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use helix_tracker_primitives::announce_event::AnnounceEvent;
use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::peer;
use helix_tracker_primitives::report::ClientReport;
use thiserror::Error;

use crate::servers::http::percent_encoding::{percent_decode_bytes, percent_decode_info_hash, percent_decode_peer_id};
use crate::servers::http::v1::query::Query;
use crate::servers::http::v1::responses;

// Query param names
const INFO_HASH: &str = "info_hash";
const PEER_ID: &str = "peer_id";
const PORT: &str = "port";
const NUMWANT: &str = "numwant";
const EVENT: &str = "event";
const LEFT: &str = "left";
const T_CHECKIN: &str = "t_checkin";
const W_DOWNLOADED: &str = "w_downloaded";
const P_DOWNLOADED: &str = "p_downloaded";
const P_UPLOADED: &str = "p_uploaded";
const C_BYTES: &str = "c_bytes";
const W_BAD: &str = "w_bad";
const W_FAIL: &str = "w_fail";
const IPV4: &str = "ipv4";
const IPV6: &str = "ipv6";
const TID: &str = "tid";
const AUTH: &str = "auth";
const REPORT_W_BAD: &str = "report_w_bad";
const DEBUG_TOKEN: &str = "s";

/// The fallback for clients that report a negative `left`: pretend there is
/// only one tiny bit left.
const NEGATIVE_LEFT_FALLBACK: u64 = 16384;

/// The magic value of the `s` param that unlocks debug behavior, like
/// bypassing the minimum announce interval.
const DEBUG_TOKEN_VALUE: &str = "0e29c350";

const DEFAULT_NUMWANT: u16 = 50;

/// A fully parsed `announce` request.
#[derive(Debug, PartialEq)]
pub struct Announce {
    pub info_hash: InfoHash,
    pub peer_id: peer::Id,
    /// The port the peer listens on. Zero means the announce must not
    /// mutate swarm state.
    pub port: u16,
    pub numwant: u16,
    /// The transfer report, including the announce event.
    pub report: ClientReport,
    /// IPv4 literal from the `ipv4` param, to supply the family the
    /// connection itself did not reveal.
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 literal from the `ipv6` param.
    pub ipv6: Option<Ipv6Addr>,
    /// Warnings to attach to the reply (unparsable `ipv4`/`ipv6` literals).
    pub warnings: Vec<String>,
    /// The torrent id used for authorization, when it differs from the
    /// info hash. Raw bytes.
    pub tid: Option<Vec<u8>>,
    /// The shared-secret auth token.
    pub auth: Option<String>,
    /// Reply with the swarm's web seed failure counters and do nothing else.
    pub report_w_bad: bool,
    /// The client passed the debug token.
    pub client_debug: bool,
}

impl Announce {
    /// The torrent id the authorization checks run against: the `tid` param
    /// if given, the info hash otherwise.
    #[must_use]
    pub fn tid_bytes(&self) -> Vec<u8> {
        self.tid.clone().unwrap_or_else(|| self.info_hash.bytes().to_vec())
    }

    /// The torrent id as a 20-byte hash for blacklist lookups, zero padded
    /// or truncated like a raw hash buffer would be.
    #[must_use]
    pub fn tid_hash(&self) -> InfoHash {
        let bytes = self.tid_bytes();
        let mut hash = [0u8; 20];
        let len = bytes.len().min(20);
        hash[..len].copy_from_slice(&bytes[..len]);
        InfoHash(hash)
    }
}

/// Errors that can occur when parsing the `Announce` request. The display
/// forms are the exact `failure reason` strings sent to clients.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseAnnounceError {
    #[error("No info_hash given.")]
    MissingInfoHash,
    #[error("invalid info_hash given.")]
    InvalidInfoHash,
    #[error("No peer_id given.")]
    MissingPeerId,
    #[error("invalid peer_id given.")]
    InvalidPeerId,
    #[error("invalid event given.")]
    InvalidEvent,
    /// A numeric field that has no lenient fallback could not be parsed.
    #[error("error handling request")]
    InvalidNumber,
}

impl From<ParseAnnounceError> for responses::error::Error {
    fn from(err: ParseAnnounceError) -> Self {
        responses::error::Error {
            failure_reason: err.to_string(),
        }
    }
}

impl TryFrom<&Query> for Announce {
    type Error = ParseAnnounceError;

    fn try_from(query: &Query) -> Result<Self, Self::Error> {
        let info_hash = extract_info_hash(query)?;
        let peer_id = extract_peer_id(query)?;
        let event = extract_event(query)?;

        let report = ClientReport {
            event,
            t_checkin: extract_number_or_zero(query, T_CHECKIN),
            left: extract_left(query)?,
            w_downloaded: extract_number_or_zero(query, W_DOWNLOADED),
            p_downloaded: extract_number_or_zero(query, P_DOWNLOADED),
            p_uploaded: extract_number_or_zero(query, P_UPLOADED),
            c_bytes: extract_number_or_zero(query, C_BYTES),
            w_bad: extract_number_or_zero(query, W_BAD),
            w_fail: extract_number_or_zero(query, W_FAIL),
        };

        let mut warnings = Vec::new();
        let ipv4 = extract_ip_literal::<Ipv4Addr>(query, IPV4, &mut warnings);
        let ipv6 = extract_ip_literal::<Ipv6Addr>(query, IPV6, &mut warnings);

        Ok(Self {
            info_hash,
            peer_id,
            port: extract_u16_or_zero(query, PORT),
            numwant: match query.get_param(NUMWANT) {
                Some(raw) => raw.parse::<u16>().unwrap_or(0),
                None => DEFAULT_NUMWANT,
            },
            report,
            ipv4,
            ipv6,
            warnings,
            tid: query.get_param(TID).map(|raw| percent_decode_bytes(&raw)),
            auth: query.get_param(AUTH),
            report_w_bad: query.get_param(REPORT_W_BAD).is_some(),
            client_debug: query.get_param(DEBUG_TOKEN).is_some_and(|token| token == DEBUG_TOKEN_VALUE),
        })
    }
}

fn extract_info_hash(query: &Query) -> Result<InfoHash, ParseAnnounceError> {
    match query.get_param(INFO_HASH) {
        Some(raw) => percent_decode_info_hash(&raw).map_err(|_| ParseAnnounceError::InvalidInfoHash),
        None => Err(ParseAnnounceError::MissingInfoHash),
    }
}

fn extract_peer_id(query: &Query) -> Result<peer::Id, ParseAnnounceError> {
    match query.get_param(PEER_ID) {
        Some(raw) => percent_decode_peer_id(&raw).map_err(|_| ParseAnnounceError::InvalidPeerId),
        None => Err(ParseAnnounceError::MissingPeerId),
    }
}

fn extract_event(query: &Query) -> Result<AnnounceEvent, ParseAnnounceError> {
    match query.get_param(EVENT).as_deref() {
        None | Some("") => Ok(AnnounceEvent::None),
        Some("started") => Ok(AnnounceEvent::Started),
        Some("completed") => Ok(AnnounceEvent::Completed),
        Some("stopped") => Ok(AnnounceEvent::Stopped),
        Some("paused") => Ok(AnnounceEvent::Paused),
        Some(_) => Err(ParseAnnounceError::InvalidEvent),
    }
}

fn extract_left(query: &Query) -> Result<u64, ParseAnnounceError> {
    match query.get_param(LEFT) {
        None => Ok(0),
        Some(raw) => match raw.parse::<u64>() {
            Ok(left) => Ok(left),
            // clients that report a negative number get the fallback;
            // everything else unparsable fails the request
            Err(_) if raw.starts_with('-') => Ok(NEGATIVE_LEFT_FALLBACK),
            Err(_) => Err(ParseAnnounceError::InvalidNumber),
        },
    }
}

fn extract_number_or_zero(query: &Query, name: &str) -> u64 {
    query
        .get_param(name)
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0)
}

fn extract_u16_or_zero(query: &Query, name: &str) -> u16 {
    query
        .get_param(name)
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(0)
}

fn extract_ip_literal<A: FromStr>(query: &Query, name: &str, warnings: &mut Vec<String>) -> Option<A> {
    let raw = query.get_param(name)?;
    match raw.parse::<A>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            let family = if name == IPV4 { "IPv4" } else { "IPv6" };
            warnings.push(format!("{family} endpoints are not supported in &{name}= argument"));
            None
        }
    }
}
