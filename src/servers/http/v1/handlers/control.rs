//! Axum handlers for the runtime control surface.
//!
//! Reads are open; every mutating PUT is gated on the request origin: by
//! default only the IPv4 loopback may change anything.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use helix_tracker_primitives::info_hash::InfoHash;
use tracing::{info, warn};

use crate::core::Tracker;
use crate::servers::http::v1::query::Query;
use crate::servers::http::v1::responses::text_response;

fn origin_ok_for_control_set(tracker: &Arc<Tracker>, remote: SocketAddr) -> bool {
    if tracker.settings.control_only_from_localhost.load(Ordering::Relaxed) {
        remote.ip() == IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        true
    }
}

fn parse_query(raw_query: Option<String>) -> Result<Query, Response> {
    raw_query
        .unwrap_or_default()
        .parse::<Query>()
        .map_err(|_| StatusCode::BAD_REQUEST.into_response())
}

/// Percent decodes every value of a query param multimap.
fn decoded_params(query: &Query) -> Vec<(String, Vec<String>)> {
    query
        .all_params()
        .into_iter()
        .map(|(name, values)| {
            let values = values
                .iter()
                .map(|value| {
                    percent_encoding::percent_decode_str(value)
                        .decode_utf8_lossy()
                        .into_owned()
                })
                .collect();
            (name, values)
        })
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// `GET /control`: every variable with its current value.
pub async fn get_controls(State(tracker): State<Arc<Tracker>>) -> Response {
    text_response(tracker.controls.dump(), &tracker.tracker_id)
}

/// `PUT /control/set`: apply the query params as variable assignments.
pub async fn set_controls(
    State(tracker): State<Arc<Tracker>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    if !origin_ok_for_control_set(&tracker, remote) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let query = match parse_query(raw_query) {
        Ok(query) => query,
        Err(response) => return response,
    };

    info!("control: {} PUT /control/set", remote);

    match tracker.controls.apply(&decoded_params(&query)) {
        Ok(0) => StatusCode::BAD_REQUEST.into_response(),
        Ok(_) => StatusCode::OK.into_response(),
        Err(control_error) => (StatusCode::BAD_REQUEST, control_error.to_string()).into_response(),
    }
}

/// `GET /control/blacklist`: the hex info hashes of all disabled swarms.
pub async fn get_blacklist(State(tracker): State<Arc<Tracker>>, RawQuery(raw_query): RawQuery) -> Response {
    let query = match parse_query(raw_query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    if !query.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let blacklist = tracker
        .torrent_blacklist()
        .iter()
        .map(InfoHash::to_hex_string)
        .collect::<Vec<String>>()
        .join(" ");

    text_response(format!("torrent_blacklist: {blacklist}\n"), &tracker.tracker_id)
}

fn set_torrents_enabled(tracker: &Arc<Tracker>, enabled: bool, hashes: &[String]) -> bool {
    let mut num_handled = 0;

    for raw in hashes {
        let Ok(info_hash) = InfoHash::from_str(raw) else {
            warn!("'{}' is not a valid info hash", raw);
            continue;
        };
        if tracker.set_swarm_enabled(&info_hash, enabled) {
            num_handled += 1;
        } else {
            warn!("No swarm found matching {}", info_hash);
        }
    }

    num_handled > 0
}

/// `PUT /control/blacklist?add=<hex>&del=<hex>`: disable or re-enable
/// swarms.
pub async fn set_blacklist(
    State(tracker): State<Arc<Tracker>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    if !origin_ok_for_control_set(&tracker, remote) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let query = match parse_query(raw_query) {
        Ok(query) => query,
        Err(response) => return response,
    };

    let mut failures = 0;
    if let Some(to_disable) = query.get_param_vec("add") {
        if !set_torrents_enabled(&tracker, false, &to_disable) {
            failures += 1;
        }
    }
    if let Some(to_enable) = query.get_param_vec("del") {
        if !set_torrents_enabled(&tracker, true, &to_enable) {
            failures += 1;
        }
    }

    if failures == 0 {
        StatusCode::OK.into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

/// `GET /control/flags/<hex info_hash>`: the swarm's flags as a csv list.
pub async fn get_swarm_flags(State(tracker): State<Arc<Tracker>>, Path(raw_info_hash): Path<String>) -> Response {
    let Ok(info_hash) = InfoHash::from_str(&raw_info_hash) else {
        return (StatusCode::NOT_FOUND, format!("{raw_info_hash}: no such swarm\n")).into_response();
    };
    let Some(shared) = tracker.swarms.get(&info_hash) else {
        return (StatusCode::NOT_FOUND, format!("{raw_info_hash}: no such swarm\n")).into_response();
    };

    let flags = shared.lock().expect("it should lock the swarm").flags_string();
    text_response(format!("Flags: {flags}\n"), &tracker.tracker_id)
}

/// `PUT /control/flags/<hex info_hash>`: set or clear flags from the query
/// params, each parsed as a bool.
pub async fn set_swarm_flags(
    State(tracker): State<Arc<Tracker>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(raw_info_hash): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    if !origin_ok_for_control_set(&tracker, remote) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let query = match parse_query(raw_query) {
        Ok(query) => query,
        Err(response) => return response,
    };

    let Ok(info_hash) = InfoHash::from_str(&raw_info_hash) else {
        return (StatusCode::NOT_FOUND, format!("{raw_info_hash}: no such swarm\n")).into_response();
    };
    let Some(shared) = tracker.swarms.get(&info_hash) else {
        return (StatusCode::NOT_FOUND, format!("{raw_info_hash}: no such swarm\n")).into_response();
    };

    let mut assignments = Vec::new();
    for (name, values) in query.all_params() {
        if values.len() != 1 {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let Some(value) = parse_bool(&values[0]) else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        assignments.push((name, value));
    }

    let result = shared.lock().expect("it should lock the swarm").set_flags(&assignments);
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(unknown_flag) => (StatusCode::NOT_FOUND, format!("{unknown_flag}\n")).into_response(),
    }
}
