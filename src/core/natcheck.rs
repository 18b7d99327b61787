//! NAT verification of claimed peer endpoints.
//!
//! Before an endpoint is advertised to other peers, the tracker opens a TCP
//! connection to it, sends a standard `BitTorrent` handshake and checks the
//! reply. Only endpoints that answer with the right protocol literal, the
//! right info hash and the announced peer id (or the load tester's magic id)
//! enter the handout tables.
//!
//! At most [`NC_MAX_CHECKING`] probes run at once; further checks wait in
//! FIFO order on the semaphore. Each stage (connect, write, read) has its own
//! [`NC_TIMEOUT`] deadline. A finished check resolves to at most one
//! [`Verified`] message on the completion channel; failures are dropped
//! silently, leaving the peer tracked but never handed out.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::peer::Id;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

/// Seconds each probe stage may take before it counts as a failure.
pub const NC_TIMEOUT: Duration = Duration::from_secs(15);
/// Maximum number of simultaneously running probes.
pub const NC_MAX_CHECKING: usize = 256;

/// Length prefix plus protocol literal of the `BitTorrent` handshake.
const PROTOCOL_HEADER: &[u8; 20] = b"\x13BitTorrent protocol";
/// The peer id the tracker identifies itself with when probing.
const PROBE_PEER_ID: &[u8; 20] = b"DNA1000-000000000000";
/// Handshake: header (20) + reserved (8) + info hash (20) + peer id (20).
pub const HANDSHAKE_LEN: usize = 68;

const COMPLETION_CHANNEL_SIZE: usize = 65_535;

/// A probe request: the endpoint a peer claimed in an announce.
#[derive(Debug, Clone, Copy)]
pub struct Check {
    pub info_hash: InfoHash,
    pub peer_id: Id,
    pub addr: SocketAddr,
}

/// A probe that succeeded. The endpoint may now be advertised.
#[derive(Debug, Clone, Copy)]
pub struct Verified {
    pub info_hash: InfoHash,
    pub peer_id: Id,
    pub addr: SocketAddr,
}

#[derive(Error, Debug)]
enum ProbeError {
    #[error("timeout while {stage}")]
    Timeout { stage: &'static str },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("incorrect protocol header")]
    BadProtocolHeader,
    #[error("incorrect infohash")]
    WrongInfoHash,
    #[error("incorrect peer id")]
    WrongPeerId,
}

/// NAT check counters. Ages are summed in microseconds from check creation
/// to completion.
#[derive(Debug, Default)]
pub struct Metrics {
    pub created: AtomicU64,
    pub deleted: AtomicU64,
    pub started: AtomicU64,
    pub success: AtomicU64,
    pub success_age_micros: AtomicU64,
    pub fail: AtomicU64,
    pub fail_age_micros: AtomicU64,
    pub timeout: AtomicU64,
    pub timeout_age_micros: AtomicU64,
    pub queued: AtomicI64,
    pub checking: AtomicI64,
    /// Sum of the queue ages in microseconds, maintained incrementally: each
    /// queued check contributes the time it has spent waiting so far.
    queued_births_micros: AtomicU64,
}

impl Metrics {
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    fn average_queue_age_secs(&self, queued_for: impl Fn() -> u64) -> f64 {
        let queued = self.queued.load(Ordering::Relaxed);
        if queued <= 0 {
            return 0.0;
        }
        let births = self.queued_births_micros.load(Ordering::Relaxed);
        let now = queued_for();
        let total_waiting = (now.saturating_mul(queued as u64)).saturating_sub(births);
        total_waiting as f64 / 1_000_000.0 / queued as f64
    }

    /// The text block `/statistics` prints for the NAT checker.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn report(&self, now_micros: u64) -> String {
        let mut out = String::new();
        out.push_str(&format!("NatCheck created: {}\n", self.created.load(Ordering::Relaxed)));
        out.push_str(&format!("NatCheck deleted: {}\n", self.deleted.load(Ordering::Relaxed)));
        out.push_str(&format!("NatCheck started: {}\n", self.started.load(Ordering::Relaxed)));
        out.push_str(&format!("NatCheck success: {}\n", self.success.load(Ordering::Relaxed)));
        out.push_str(&format!(
            "NatCheck success time: {}\n",
            self.success_age_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
        ));
        out.push_str(&format!("NatCheck fail: {}\n", self.fail.load(Ordering::Relaxed)));
        out.push_str(&format!(
            "NatCheck fail time: {}\n",
            self.fail_age_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
        ));
        out.push_str(&format!("NatCheck timeout: {}\n", self.timeout.load(Ordering::Relaxed)));
        out.push_str(&format!(
            "NatCheck timeout time: {}\n",
            self.timeout_age_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
        ));
        out.push_str(&format!("NatCheck queue length: {}\n", self.queued.load(Ordering::Relaxed)));
        out.push_str(&format!(
            "NatCheck queue average age: {}\n",
            self.average_queue_age_secs(|| now_micros)
        ));
        out.push_str(&format!("NatCheck num_checking: {}\n", self.checking.load(Ordering::Relaxed)));
        out
    }
}

/// The NAT check service. Owns the concurrency cap and the completion
/// channel; dropping all receivers makes further successes no-ops.
pub struct Service {
    semaphore: Arc<Semaphore>,
    verified_tx: mpsc::Sender<Verified>,
    metrics: Arc<Metrics>,
    epoch: Instant,
}

impl Service {
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<Verified>) {
        let (verified_tx, verified_rx) = mpsc::channel(COMPLETION_CHANNEL_SIZE);
        (
            Self {
                semaphore: Arc::new(Semaphore::new(NC_MAX_CHECKING)),
                verified_tx,
                metrics: Arc::new(Metrics::default()),
                epoch: Instant::now(),
            },
            verified_rx,
        )
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    #[must_use]
    pub fn now_micros(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Queues a probe. Runs immediately if fewer than [`NC_MAX_CHECKING`]
    /// probes are in flight, otherwise waits its turn.
    pub fn enqueue(&self, check: Check) {
        let semaphore = self.semaphore.clone();
        let verified_tx = self.verified_tx.clone();
        let metrics = self.metrics.clone();
        let born = Instant::now();
        let born_micros = self.now_micros();

        metrics.created.fetch_add(1, Ordering::Relaxed);
        metrics.queued.fetch_add(1, Ordering::Relaxed);
        metrics.queued_births_micros.fetch_add(born_micros, Ordering::Relaxed);

        tokio::spawn(async move {
            // queued acquires are served in FIFO order
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };
            metrics.queued.fetch_sub(1, Ordering::Relaxed);
            metrics.queued_births_micros.fetch_sub(born_micros, Ordering::Relaxed);
            metrics.started.fetch_add(1, Ordering::Relaxed);
            metrics.checking.fetch_add(1, Ordering::Relaxed);

            let result = probe(check.addr, &check.info_hash, &check.peer_id).await;
            let age_micros = u64::try_from(born.elapsed().as_micros()).unwrap_or(u64::MAX);

            match result {
                Ok(()) => {
                    metrics.success.fetch_add(1, Ordering::Relaxed);
                    metrics.success_age_micros.fetch_add(age_micros, Ordering::Relaxed);
                    // dropped receivers turn late successes into no-ops
                    let _ = verified_tx
                        .send(Verified {
                            info_hash: check.info_hash,
                            peer_id: check.peer_id,
                            addr: check.addr,
                        })
                        .await;
                }
                Err(ProbeError::Timeout { stage }) => {
                    metrics.timeout.fetch_add(1, Ordering::Relaxed);
                    metrics.timeout_age_micros.fetch_add(age_micros, Ordering::Relaxed);
                    debug!("natcheck timeout for {}: while {}", check.addr, stage);
                }
                Err(error) => {
                    metrics.fail.fetch_add(1, Ordering::Relaxed);
                    metrics.fail_age_micros.fetch_add(age_micros, Ordering::Relaxed);
                    debug!("natcheck fail for {}: {}", check.addr, error);
                }
            }

            metrics.checking.fetch_sub(1, Ordering::Relaxed);
            metrics.deleted.fetch_add(1, Ordering::Relaxed);
            drop(permit);
        });
    }
}

async fn probe(addr: SocketAddr, info_hash: &InfoHash, peer_id: &Id) -> Result<(), ProbeError> {
    let mut stream = tokio::time::timeout(NC_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeError::Timeout { stage: "connecting" })??;

    let packet = build_handshake(info_hash);
    tokio::time::timeout(NC_TIMEOUT, stream.write_all(&packet))
        .await
        .map_err(|_| ProbeError::Timeout { stage: "writing" })??;

    let mut response = [0u8; HANDSHAKE_LEN];
    tokio::time::timeout(NC_TIMEOUT, stream.read_exact(&mut response))
        .await
        .map_err(|_| ProbeError::Timeout { stage: "reading" })??;

    parse_handshake(&response, info_hash, peer_id)
}

fn build_handshake(info_hash: &InfoHash) -> [u8; HANDSHAKE_LEN] {
    let mut packet = [0u8; HANDSHAKE_LEN];
    packet[..20].copy_from_slice(PROTOCOL_HEADER);
    // 8 reserved bytes stay zero
    packet[28..48].copy_from_slice(&info_hash.bytes());
    packet[48..68].copy_from_slice(PROBE_PEER_ID);
    packet
}

fn parse_handshake(response: &[u8; HANDSHAKE_LEN], info_hash: &InfoHash, peer_id: &Id) -> Result<(), ProbeError> {
    if &response[..20] != PROTOCOL_HEADER {
        return Err(ProbeError::BadProtocolHeader);
    }
    if response[28..48] != info_hash.bytes() {
        return Err(ProbeError::WrongInfoHash);
    }
    if response[48..68] != peer_id.bytes() {
        // exclude the magic id, for the load tester
        let mut responded = [0u8; 20];
        responded.copy_from_slice(&response[48..68]);
        if !Id(responded).is_load_tester() {
            return Err(ProbeError::WrongPeerId);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::info_hash::InfoHash;
    use helix_tracker_primitives::peer::Id;

    use super::{build_handshake, parse_handshake, HANDSHAKE_LEN, PROBE_PEER_ID};

    fn sample_info_hash() -> InfoHash {
        InfoHash([0x42; 20])
    }

    #[test]
    fn the_handshake_packet_has_the_documented_layout() {
        let packet = build_handshake(&sample_info_hash());

        assert_eq!(packet.len(), HANDSHAKE_LEN);
        assert_eq!(packet[0], 19);
        assert_eq!(&packet[1..20], b"BitTorrent protocol");
        assert_eq!(&packet[20..28], &[0u8; 8]);
        assert_eq!(&packet[28..48], &[0x42; 20]);
        assert_eq!(&packet[48..68], PROBE_PEER_ID);
    }

    #[test]
    fn a_response_echoing_the_announced_peer_id_passes() {
        let peer_id = Id(*b"-qB00000000000000001");
        let mut response = build_handshake(&sample_info_hash());
        response[48..68].copy_from_slice(&peer_id.bytes());

        assert!(parse_handshake(&response, &sample_info_hash(), &peer_id).is_ok());
    }

    #[test]
    fn a_response_with_the_load_tester_magic_id_passes() {
        let peer_id = Id(*b"-qB00000000000000001");
        let mut response = build_handshake(&sample_info_hash());
        response[48..68].copy_from_slice(b"MAGICMAG000000000000");

        assert!(parse_handshake(&response, &sample_info_hash(), &peer_id).is_ok());
    }

    #[test]
    fn responses_with_the_wrong_protocol_info_hash_or_peer_id_fail() {
        let peer_id = Id(*b"-qB00000000000000001");

        let mut bad_protocol = build_handshake(&sample_info_hash());
        bad_protocol[48..68].copy_from_slice(&peer_id.bytes());
        bad_protocol[0] = 18;
        assert!(parse_handshake(&bad_protocol, &sample_info_hash(), &peer_id).is_err());

        let mut bad_hash = build_handshake(&sample_info_hash());
        bad_hash[48..68].copy_from_slice(&peer_id.bytes());
        bad_hash[30] ^= 0xFF;
        assert!(parse_handshake(&bad_hash, &sample_info_hash(), &peer_id).is_err());

        let bad_peer = build_handshake(&sample_info_hash());
        assert!(parse_handshake(&bad_peer, &sample_info_hash(), &peer_id).is_err());
    }

    #[tokio::test]
    async fn a_probe_against_a_real_responder_succeeds_end_to_end() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let info_hash = sample_info_hash();
        let peer_id = Id(*b"-qB00000000000000001");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut request).await.unwrap();
            // echo the handshake back with the announced peer id
            let mut reply = request;
            reply[48..68].copy_from_slice(b"-qB00000000000000001");
            socket.write_all(&reply).await.unwrap();
        });

        let result = super::probe(addr, &info_hash, &peer_id).await;

        assert!(result.is_ok());
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn a_probe_against_a_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = super::probe(addr, &sample_info_hash(), &Id([0; 20])).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_verified_message_is_delivered_for_a_passing_check() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (service, mut verified_rx) = super::Service::new();
        let info_hash = sample_info_hash();
        let peer_id = Id(*b"-qB00000000000000009");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; HANDSHAKE_LEN];
            socket.read_exact(&mut request).await.unwrap();
            let mut reply = request;
            reply[48..68].copy_from_slice(b"-qB00000000000000009");
            socket.write_all(&reply).await.unwrap();
        });

        service.enqueue(super::Check {
            info_hash,
            peer_id,
            addr,
        });

        let verified = verified_rx.recv().await.unwrap();
        assert_eq!(verified.addr, addr);
        assert_eq!(verified.peer_id, peer_id);
        assert_eq!(
            service.metrics().success.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
