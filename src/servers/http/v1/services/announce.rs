//! The `announce` application service.
//!
//! It ties the whole announce pipeline together: address resolution,
//! authorization, swarm lookup, the swarm state transition, NAT check
//! dispatch, statistics events and the reply body.
use std::net::IpAddr;
use std::sync::Arc;

use helix_tracker_clock::clock::Time;
use rand::Rng;

use crate::core::statistics::Event;
use crate::core::swarm::{INTERVAL, INTERVAL_RANDOM, MIN_INTERVAL, SNAP_DELTA};
use crate::core::Tracker;
use crate::servers::http::v1::requests::announce::Announce;
use crate::servers::http::v1::responses::{self, SwarmContext};
use crate::servers::http::v1::services::peer_ip_resolver::{self, ClientIpSources};
use crate::CurrentClock;

/// What one request resolved to: a complete bencoded body plus the swarm
/// header values, when a swarm context was reached.
pub struct ServiceReply {
    pub body: Vec<u8>,
    pub swarm: Option<SwarmContext>,
}

fn failure(reason: &str, swarm: Option<SwarmContext>) -> ServiceReply {
    let error = responses::error::Error {
        failure_reason: reason.to_string(),
    };
    ServiceReply {
        body: error.write().into_bytes(),
        swarm,
    }
}

#[allow(clippy::cast_possible_wrap)]
fn jittered_interval() -> i64 {
    let half_range = (INTERVAL_RANDOM / 2) as i64;
    INTERVAL as i64 + rand::thread_rng().gen_range(-half_range..half_range)
}

/// Handles one announce request end to end.
#[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
pub async fn invoke(tracker: &Arc<Tracker>, announce: Announce, sources: &ClientIpSources) -> ServiceReply {
    let resolved = match peer_ip_resolver::invoke(sources, announce.ipv4, announce.ipv6) {
        Ok(resolved) => resolved,
        Err(error) => return failure(&error.to_string(), None),
    };

    match resolved.external_ip {
        IpAddr::V4(_) => tracker.send_stats_event(Event::Tcp4Announce).await,
        IpAddr::V6(_) => tracker.send_stats_event(Event::Tcp6Announce).await,
    }

    if let Err(error) = tracker.authorize_announce(
        &announce.info_hash,
        &announce.tid_bytes(),
        &announce.tid_hash(),
        announce.auth.as_deref(),
    ) {
        return failure(&error.to_string(), None);
    }

    let shared = tracker.swarm_for_announce(&announce.info_hash);

    // the swarm mutex must not be held across an await point
    let (outcome, swarm_context) = {
        let mut swarm = shared.lock().expect("it should lock the swarm");
        let swarm_context = SwarmContext {
            rank: swarm.rank(),
            cpu_load: swarm.cpu_load(),
        };

        if swarm.is_disabled() {
            return failure("Swarm is blacklisted.", Some(swarm_context));
        }

        if announce.report_w_bad {
            let report = responses::announce::WBadReport {
                info_hash: announce.info_hash,
                w_bad: swarm.w_bad(),
                c_w_bad: swarm.cumulative_w_bad(),
            };
            return ServiceReply {
                body: report.body(),
                swarm: Some(swarm_context),
            };
        }

        if swarm.is_terminated() {
            let terminate = responses::announce::Terminate {
                info_hash: announce.info_hash,
            };
            return ServiceReply {
                body: terminate.body(),
                swarm: Some(swarm_context),
            };
        }

        let policy = tracker.settings.announce_policy();
        let now = CurrentClock::now_secs();

        match swarm.handle_announce(
            announce.peer_id,
            resolved.v4,
            announce.port,
            resolved.v6,
            announce.port,
            announce.numwant,
            &announce.report,
            announce.client_debug,
            &policy,
            now,
        ) {
            Ok(outcome) => (outcome, swarm_context),
            Err(rejection) => return failure(&rejection.to_string(), Some(swarm_context)),
        }
    };

    if outcome.created {
        tracker.send_stats_event(Event::PeersCreated(1)).await;
    }
    if outcome.delivered > 0 {
        tracker.send_stats_event(Event::PeersDelivered(outcome.delivered as u64)).await;
    }

    tracker.launch_nat_checks(announce.info_hash, announce.peer_id, &outcome.nat_checks);

    let response = responses::announce::Announce {
        info_hash: announce.info_hash,
        peers: outcome.peers,
        peers6: outcome.peers6,
        interval: jittered_interval(),
        min_interval: MIN_INTERVAL as i64,
        external_ip: resolved.external_ip,
        snap_delta: SNAP_DELTA as i64,
        warning: announce.warnings.last().cloned(),
    };

    ServiceReply {
        body: response.body(),
        swarm: Some(swarm_context),
    }
}
