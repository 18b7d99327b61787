//! Durable swarm snapshots.
//!
//! The whole tracker state is periodically rewritten to one flat file so a
//! restart does not empty every swarm. The format is a concatenation of
//! swarm records:
//!
//! ```text
//! 20 bytes   info_hash
//! 4 bytes    number of peers (big endian)
//!
//! for each peer:
//!
//! 20 bytes   peer_id
//! 4 bytes    last check-in (big endian)
//! 1 byte     status (IS_ROUTABLE_V6 and HAS_V6 masked out)
//! 4 bytes    IPv4 address (network order)
//! 2 bytes    port (big endian)
//! ```
//!
//! At most [`MAX_PEERS_PER_SWARM`] routable IPv4 peers are sampled per
//! swarm, in category order. IPv6 state is never persisted. Writes are best
//! effort; a failed checkpoint is logged and retried on the next timer.
//! Truncated files decode to whatever complete records they contain.
use std::io::Write;
use std::path::Path;

use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::peer::Id;
use tracing::info;

use super::repository::Swarms;
use super::swarm::endpoints::{CompactEndpoint, CompactV4};
use super::swarm::peer::{HAS_V6, IS_ROUTABLE_V6};
use super::swarm::Swarm;

/// The checkpoint lives in the working directory under this name.
pub const CHECKPOINT_FILE: &str = "tracker_checkpoint";

/// Cap on peers saved per swarm.
pub const MAX_PEERS_PER_SWARM: usize = 40;

/// Sanity gate for the read path: refuse files that would hold more than 50
/// million peers.
pub const MAX_FILE_SIZE: u64 = 50_000_000 * 35;

const SWARM_HEADER_LEN: usize = 20 + 4;
const PEER_RECORD_LEN: usize = 20 + 4 + 1 + 4 + 2;

/// Appends one swarm's record to `out`. Swarms with no peers at all are
/// skipped entirely.
pub fn encode_swarm(swarm: &Swarm, out: &mut Vec<u8>) {
    if swarm.is_empty() {
        return;
    }

    let sampled = swarm.snapshot_peers(MAX_PEERS_PER_SWARM);

    out.extend_from_slice(&swarm.info_hash().bytes());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(sampled.len() as u32).to_be_bytes());

    for (peer_id, entry, endpoint) in sampled {
        out.extend_from_slice(&peer_id.bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(entry.last_check_in as u32).to_be_bytes());
        out.push(entry.status.bits() & !(IS_ROUTABLE_V6 | HAS_V6));
        out.extend_from_slice(endpoint.as_bytes());
    }
}

/// Encodes every swarm in the table.
#[must_use]
pub fn encode_all(swarms: &Swarms) -> Vec<u8> {
    // guess that the average swarm holds 100 peers
    let mut out = Vec::with_capacity(swarms.len() * (SWARM_HEADER_LEN + 100 * PEER_RECORD_LEN));
    swarms.for_each(|swarm| encode_swarm(swarm, &mut out));
    out
}

/// Decodes a checkpoint into swarms. Returns the swarms and the total number
/// of restored peers. Truncated or corrupt trailing data terminates decoding
/// without error.
#[must_use]
pub fn decode(bytes: &[u8], default_dna_only: bool) -> (Vec<Swarm>, usize) {
    let mut swarms = Vec::new();
    let mut total_peers = 0;

    let mut cursor = bytes;
    while cursor.len() > SWARM_HEADER_LEN {
        let mut info_hash_bytes = [0u8; 20];
        info_hash_bytes.copy_from_slice(&cursor[..20]);
        let num_peers = u32::from_be_bytes([cursor[20], cursor[21], cursor[22], cursor[23]]) as usize;
        cursor = &cursor[SWARM_HEADER_LEN..];

        let mut swarm = Swarm::new(InfoHash(info_hash_bytes), default_dna_only);
        let num_peers = num_peers.min(MAX_PEERS_PER_SWARM);

        for _ in 0..num_peers {
            if cursor.len() < PEER_RECORD_LEN {
                swarms.push(swarm);
                return (swarms, total_peers);
            }

            let mut peer_id_bytes = [0u8; 20];
            peer_id_bytes.copy_from_slice(&cursor[..20]);
            let last_check_in = u64::from(u32::from_be_bytes([cursor[20], cursor[21], cursor[22], cursor[23]]));
            let status_bits = cursor[24];
            let mut endpoint_bytes = [0u8; 6];
            endpoint_bytes.copy_from_slice(&cursor[25..31]);
            cursor = &cursor[PEER_RECORD_LEN..];

            if !swarm.restore_peer(Id(peer_id_bytes), last_check_in, status_bits, CompactV4(endpoint_bytes)) {
                // a record that cannot have been written by us: stop here
                swarms.push(swarm);
                return (swarms, total_peers);
            }
            total_peers += 1;
        }

        swarms.push(swarm);
    }

    (swarms, total_peers)
}

/// Rewrites the checkpoint file from the current swarm table. Returns the
/// number of bytes written.
///
/// # Errors
///
/// Returns the underlying I/O error; callers log it and carry on.
pub fn save_to_file(path: &Path, swarms: &Swarms) -> std::io::Result<usize> {
    let encoded = encode_all(swarms);

    let mut file = std::fs::File::create(path)?;
    file.write_all(&encoded)?;

    Ok(encoded.len())
}

/// Loads the checkpoint file into the swarm table, if one exists and passes
/// the size sanity check.
///
/// # Errors
///
/// Returns the underlying I/O error when the file exists but cannot be read.
pub fn load_from_file(path: &Path, swarms: &Swarms, default_dna_only: bool) -> std::io::Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };
    if metadata.len() == 0 || metadata.len() >= MAX_FILE_SIZE {
        return Ok(());
    }

    let bytes = std::fs::read(path)?;
    let (restored, total_peers) = decode(&bytes, default_dna_only);
    let num_swarms = restored.len();

    for swarm in restored {
        swarms.insert_restored(swarm);
    }

    info!(
        "loaded tracker state from checkpoint. {} swarms, {} peers total",
        num_swarms, total_peers
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use helix_tracker_primitives::info_hash::InfoHash;
    use helix_tracker_primitives::peer::Id;

    use super::super::swarm::endpoints::CompactV4;
    use super::super::swarm::peer::{Category, HAS_V4, IS_COMPLETE, IS_ROUTABLE_V4};
    use super::super::swarm::{Family, Swarm};
    use super::{decode, encode_swarm, MAX_PEERS_PER_SWARM};

    fn swarm_with_routable_peers(info_hash: u8, peers: &[(u8, u8)]) -> Swarm {
        let mut swarm = Swarm::new(InfoHash([info_hash; 20]), false);
        for (n, status_extra) in peers {
            let status = IS_ROUTABLE_V4 | HAS_V4 | status_extra;
            assert!(swarm.restore_peer(
                Id([*n; 20]),
                1000 + u64::from(*n),
                status,
                CompactV4::new(Ipv4Addr::new(10, 0, 0, *n), 6881),
            ));
        }
        swarm
    }

    #[test]
    fn an_empty_swarm_encodes_to_nothing() {
        let swarm = Swarm::new(InfoHash([1; 20]), false);
        let mut out = Vec::new();

        encode_swarm(&swarm, &mut out);

        assert!(out.is_empty());
    }

    #[test]
    fn a_swarm_record_has_the_documented_layout() {
        let swarm = swarm_with_routable_peers(0x61, &[(1, 0)]);
        let mut out = Vec::new();

        encode_swarm(&swarm, &mut out);

        assert_eq!(out.len(), 24 + 31);
        assert_eq!(&out[..20], &[0x61; 20]);
        assert_eq!(&out[20..24], &1u32.to_be_bytes());
        assert_eq!(&out[24..44], &[1; 20]);
        assert_eq!(&out[44..48], &1001u32.to_be_bytes());
        assert_eq!(out[48], IS_ROUTABLE_V4 | HAS_V4);
        assert_eq!(&out[49..53], &[10, 0, 0, 1]);
        assert_eq!(&out[53..55], &6881u16.to_be_bytes());
    }

    #[test]
    fn a_round_trip_preserves_swarms_peers_and_masked_status() {
        let first = swarm_with_routable_peers(0x61, &[(1, IS_COMPLETE), (2, 0), (3, 0)]);
        let second = swarm_with_routable_peers(0x62, &[(4, 0)]);

        let mut bytes = Vec::new();
        encode_swarm(&first, &mut bytes);
        encode_swarm(&second, &mut bytes);

        let (restored, total_peers) = decode(&bytes, false);

        assert_eq!(restored.len(), 2);
        assert_eq!(total_peers, 4);
        assert_eq!(restored[0].info_hash(), InfoHash([0x61; 20]));
        assert_eq!(restored[0].num_seeds(), 1);
        assert_eq!(restored[0].num_peers(), 2);
        assert_eq!(restored[0].endpoint_count(Category::Seeding, Family::V4), 1);
        assert_eq!(restored[0].endpoint_count(Category::Active, Family::V4), 2);
        assert_eq!(restored[1].info_hash(), InfoHash([0x62; 20]));
        assert!(restored.iter().all(Swarm::invariant_holds));
    }

    #[test]
    fn ipv6_flags_are_masked_out_on_save() {
        use super::super::swarm::peer::{HAS_V6, IS_ROUTABLE_V6};

        let mut swarm = Swarm::new(InfoHash([0x61; 20]), false);
        assert!(swarm.restore_peer(
            Id([1; 20]),
            1000,
            IS_ROUTABLE_V4 | HAS_V4,
            CompactV4::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
        ));

        let mut bytes = Vec::new();
        encode_swarm(&swarm, &mut bytes);
        let (restored, _) = decode(&bytes, false);

        let status = bytes[48];
        assert_eq!(status & (IS_ROUTABLE_V6 | HAS_V6), 0);
        assert_eq!(restored[0].endpoint_count(Category::Active, Family::V6), 0);
    }

    #[test]
    fn at_most_forty_peers_are_saved_per_swarm() {
        let peers: Vec<(u8, u8)> = (1..=50).map(|n| (n, 0)).collect();
        let swarm = swarm_with_routable_peers(0x61, &peers);

        let mut bytes = Vec::new();
        encode_swarm(&swarm, &mut bytes);

        assert_eq!(bytes.len(), 24 + MAX_PEERS_PER_SWARM * 31);
        let (restored, total_peers) = decode(&bytes, false);
        assert_eq!(total_peers, MAX_PEERS_PER_SWARM);
        assert_eq!(restored[0].load_metric(), MAX_PEERS_PER_SWARM);
    }

    #[test]
    fn seeding_peers_are_sampled_before_active_and_paused() {
        let swarm = swarm_with_routable_peers(0x61, &[(1, 0), (2, IS_COMPLETE)]);

        let mut bytes = Vec::new();
        encode_swarm(&swarm, &mut bytes);

        // peer 2 is the seeder and must come first
        assert_eq!(&bytes[24..44], &[2; 20]);
    }

    #[test]
    fn truncated_trailing_records_terminate_parsing_without_error() {
        let swarm = swarm_with_routable_peers(0x61, &[(1, 0), (2, 0)]);
        let mut bytes = Vec::new();
        encode_swarm(&swarm, &mut bytes);

        bytes.truncate(bytes.len() - 10);
        let (restored, total_peers) = decode(&bytes, false);

        assert_eq!(restored.len(), 1);
        assert_eq!(total_peers, 1);
    }

    #[test]
    fn garbage_input_decodes_to_nothing() {
        let (restored, total_peers) = decode(&[0u8; 10], false);

        assert!(restored.is_empty());
        assert_eq!(total_peers, 0);
    }

    #[test]
    fn save_and_load_round_trip_through_a_file() {
        use super::super::repository::Swarms;

        let swarms = Swarms::default();
        {
            let shared = swarms.get_or_create(&InfoHash([0x61; 20]), false);
            let mut swarm = shared.lock().unwrap();
            assert!(swarm.restore_peer(
                Id([7; 20]),
                1234,
                IS_ROUTABLE_V4 | HAS_V4,
                CompactV4::new(Ipv4Addr::new(10, 0, 0, 7), 6881),
            ));
        }

        let file = tempfile::NamedTempFile::new().unwrap();
        let written = super::save_to_file(file.path(), &swarms).unwrap();
        assert_eq!(written, 24 + 31);

        let reloaded = Swarms::default();
        super::load_from_file(file.path(), &reloaded, false).unwrap();

        assert_eq!(reloaded.len(), 1);
        let shared = reloaded.get(&InfoHash([0x61; 20])).unwrap();
        let swarm = shared.lock().unwrap();
        assert_eq!(swarm.num_peers(), 1);
        assert_eq!(swarm.endpoint_count(Category::Active, Family::V4), 1);
    }
}
