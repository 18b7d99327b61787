//! Integration test: a full checkpoint save and restore cycle across two
//! tracker instances, the way a restart would run it.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use helix_tracker::core::natcheck::Verified;
use helix_tracker::core::swarm::peer::{HAS_V6, IS_ROUTABLE_V6};
use helix_tracker::core::{checkpoint, statistics, Tracker};
use helix_tracker_primitives::announce_event::AnnounceEvent;
use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::peer::Id;
use helix_tracker_primitives::report::ClientReport;

fn tracker() -> Arc<Tracker> {
    let (tracker, _verified_rx) = Tracker::new(None, statistics::Repo::new(), "00000000AAAA".to_string());
    Arc::new(tracker)
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Announces a peer and immediately applies its NAT check results, making
/// every claimed endpoint routable.
fn join_routable(tracker: &Arc<Tracker>, info_hash: InfoHash, peer_id: Id, addr: SocketAddr, left: u64) {
    let shared = tracker.swarm_for_announce(&info_hash);
    let report = ClientReport {
        left,
        event: AnnounceEvent::Started,
        ..ClientReport::default()
    };
    let (v4, v6) = match addr {
        SocketAddr::V4(v4_addr) => (Some(*v4_addr.ip()), None),
        SocketAddr::V6(v6_addr) => (None, Some(*v6_addr.ip())),
    };
    let outcome = shared
        .lock()
        .unwrap()
        .handle_announce(
            peer_id,
            v4,
            addr.port(),
            v6,
            addr.port(),
            50,
            &report,
            false,
            &tracker.settings.announce_policy(),
            now(),
        )
        .unwrap();
    for check_addr in outcome.nat_checks {
        tracker.apply_verified(&Verified {
            info_hash,
            peer_id,
            addr: check_addr,
        });
    }
}

#[test]
fn a_checkpoint_survives_a_restart_with_identical_ipv4_state_and_no_ipv6_state() {
    let first_swarm = InfoHash([0x61; 20]);
    let second_swarm = InfoHash([0x62; 20]);

    let original = tracker();
    for n in 1..=3u8 {
        join_routable(
            &original,
            first_swarm,
            Id([n; 20]),
            format!("10.0.0.{n}:6881").parse().unwrap(),
            if n == 1 { 0 } else { 100 },
        );
        join_routable(
            &original,
            second_swarm,
            Id([0x10 + n; 20]),
            format!("10.0.1.{n}:6882").parse().unwrap(),
            100,
        );
    }
    // one dual-stack peer whose IPv6 endpoint must not survive the restart
    join_routable(
        &original,
        first_swarm,
        Id([0x77; 20]),
        "[2001:db8::7]:7000".parse().unwrap(),
        100,
    );

    let checkpoint_file = tempfile::NamedTempFile::new().unwrap();
    checkpoint::save_to_file(checkpoint_file.path(), &original.swarms).unwrap();

    let restarted = tracker();
    checkpoint::load_from_file(checkpoint_file.path(), &restarted.swarms, false).unwrap();

    // both swarms are back
    assert_eq!(restarted.swarms.len(), 2);

    for info_hash in [first_swarm, second_swarm] {
        let original_swarm = original.swarms.get(&info_hash).unwrap();
        let restored_swarm = restarted.swarms.get(&info_hash).unwrap();

        let original_peers: HashMap<Id, _> = original_swarm
            .lock()
            .unwrap()
            .snapshot_peers(40)
            .into_iter()
            .map(|(id, entry, endpoint)| (id, (entry.last_check_in, endpoint)))
            .collect();
        let restored_peers: HashMap<Id, _> = restored_swarm
            .lock()
            .unwrap()
            .snapshot_peers(40)
            .into_iter()
            .map(|(id, entry, endpoint)| (id, (entry.last_check_in, endpoint)))
            .collect();

        // the routable IPv4 peers round-trip exactly, check-in times included
        assert_eq!(original_peers, restored_peers);
        assert!(!restored_peers.is_empty());

        // no restored peer carries IPv6 state
        for (_, entry, _) in restored_swarm.lock().unwrap().snapshot_peers(40) {
            assert!(!entry.status.has(IS_ROUTABLE_V6));
            assert!(!entry.status.has(HAS_V6));
        }
    }

    // the v6-only peer of the first swarm was tracked but never persisted
    let restored_first = restarted.swarms.get(&first_swarm).unwrap();
    assert_eq!(restored_first.lock().unwrap().load_metric(), 3);

    // scrape counters agree for the persisted peers
    let scrape = restarted.scrape(&[first_swarm, second_swarm]);
    assert_eq!(scrape.files[&first_swarm].complete, 1);
    assert_eq!(scrape.files[&first_swarm].incomplete, 2);
    assert_eq!(scrape.files[&second_swarm].incomplete, 3);
}

#[test]
fn an_announce_after_the_restart_hands_out_the_restored_endpoints() {
    let info_hash = InfoHash([0x63; 20]);

    let original = tracker();
    for n in 1..=3u8 {
        join_routable(
            &original,
            info_hash,
            Id([n; 20]),
            format!("10.0.2.{n}:6881").parse().unwrap(),
            0,
        );
    }

    let checkpoint_file = tempfile::NamedTempFile::new().unwrap();
    checkpoint::save_to_file(checkpoint_file.path(), &original.swarms).unwrap();

    let restarted = tracker();
    checkpoint::load_from_file(checkpoint_file.path(), &restarted.swarms, false).unwrap();

    // a fresh downloader announces against the restored swarm and receives
    // the three persisted seeders
    let shared = restarted.swarm_for_announce(&info_hash);
    let report = ClientReport {
        left: 1000,
        event: AnnounceEvent::Started,
        ..ClientReport::default()
    };
    let outcome = shared
        .lock()
        .unwrap()
        .handle_announce(
            Id([0x99; 20]),
            Some("10.9.9.9".parse().unwrap()),
            6881,
            None,
            6881,
            50,
            &report,
            false,
            &restarted.settings.announce_policy(),
            now(),
        )
        .unwrap();

    assert_eq!(outcome.peers.len(), 3 * 6);
    assert!(outcome.peers6.is_empty());
}
