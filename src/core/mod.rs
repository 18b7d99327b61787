//! The core tracker: the domain layer that maintains swarm state,
//! independent of the HTTP delivery layer.
//!
//! The [`Tracker`] owns the swarm table, the runtime control registry, the
//! external blacklist, the NAT check service and the statistics. Delivery
//! layers (the HTTP tracker) parse requests, call into here, and format the
//! bencoded replies.
pub mod auth;
pub mod blacklist;
pub mod checkpoint;
pub mod control;
pub mod error;
pub mod natcheck;
pub mod repository;
pub mod statistics;
pub mod swarm;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use helix_tracker_clock::clock::Time;
use helix_tracker_primitives::info_hash::InfoHash;
use helix_tracker_primitives::swarm_metadata::SwarmMetadata;
use tokio::sync::mpsc;
use tracing::info;

use self::blacklist::Blacklist;
use self::control::ControlRegistry;
use self::error::Error;
use self::natcheck::Verified;
use self::repository::{SharedSwarm, Swarms};
use self::swarm::handout::Strategy;
use self::swarm::{AnnouncePolicy, INTERVAL};
use crate::CurrentClock;

/// Runtime adjustable settings, each in a shared cell so the control
/// registry and config files can change them while requests are in flight.
pub struct RuntimeSettings {
    pub control_only_from_localhost: Arc<AtomicBool>,
    pub enforce_auth_token: Arc<AtomicBool>,
    pub enforce_db_blacklist: Arc<AtomicBool>,
    pub secret_auth_token: Arc<RwLock<String>>,
    pub swarm_enforce_dna_only: Arc<AtomicBool>,
    pub swarm_default_dna_only: Arc<AtomicBool>,
    pub swarm_dna_only_prefix: Arc<RwLock<String>>,
    pub max_handouts_per_interval: Arc<AtomicI64>,
    pub peer_selection_algorithm: Arc<RwLock<Strategy>>,
    pub mysql_db: Arc<RwLock<String>>,
    pub mysql_host: Arc<RwLock<String>>,
    pub mysql_user: Arc<RwLock<String>>,
    pub mysql_password: Arc<RwLock<String>>,
    pub mysql_port: Arc<AtomicI64>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            control_only_from_localhost: Arc::new(AtomicBool::new(true)),
            enforce_auth_token: Arc::new(AtomicBool::new(false)),
            enforce_db_blacklist: Arc::new(AtomicBool::new(true)),
            secret_auth_token: Arc::new(RwLock::new("sekret".to_string())),
            swarm_enforce_dna_only: Arc::new(AtomicBool::new(false)),
            swarm_default_dna_only: Arc::new(AtomicBool::new(false)),
            swarm_dna_only_prefix: Arc::new(RwLock::new("DNA".to_string())),
            max_handouts_per_interval: Arc::new(AtomicI64::new(50)),
            peer_selection_algorithm: Arc::new(RwLock::new(Strategy::Sequential)),
            mysql_db: Arc::new(RwLock::new(String::new())),
            mysql_host: Arc::new(RwLock::new(String::new())),
            mysql_user: Arc::new(RwLock::new(String::new())),
            mysql_password: Arc::new(RwLock::new(String::new())),
            mysql_port: Arc::new(AtomicI64::new(3306)),
        }
    }
}

impl RuntimeSettings {
    /// Registers every variable with the control registry.
    pub fn register(&self, controls: &mut ControlRegistry) {
        controls.add_bool("control_only_from_localhost", &self.control_only_from_localhost);
        controls.add_bool("enforce_auth_token", &self.enforce_auth_token);
        controls.add_bool("enforce_db_blacklist", &self.enforce_db_blacklist);
        controls.add_string("secret_auth_token", &self.secret_auth_token);
        controls.add_bool("swarm_enforce_dna_only", &self.swarm_enforce_dna_only);
        controls.add_bool("swarm_default_dna_only", &self.swarm_default_dna_only);
        controls.add_string("swarm_dna_only_prefix", &self.swarm_dna_only_prefix);
        controls.add_int("max_handouts_per_interval", &self.max_handouts_per_interval);
        controls.add_string("mysql_db", &self.mysql_db);
        controls.add_string("mysql_host", &self.mysql_host);
        controls.add_string("mysql_user", &self.mysql_user);
        controls.add_string("mysql_password", &self.mysql_password);
        controls.add_int("mysql_port", &self.mysql_port);

        let strategy_set = self.peer_selection_algorithm.clone();
        let strategy_get = self.peer_selection_algorithm.clone();
        controls.add_variable(
            "peer_selection_algorithm",
            Box::new(move |args| {
                let value = args.first().ok_or(control::ControlError::MissingValue)?;
                let strategy = value
                    .parse::<Strategy>()
                    .map_err(|message| control::ControlError::InvalidValue { message })?;
                *strategy_set.write().expect("it should lock the variable cell") = strategy;
                Ok(())
            }),
            Box::new(move || {
                strategy_get
                    .read()
                    .expect("it should lock the variable cell")
                    .to_string()
            }),
        );
    }

    /// A consistent snapshot of the knobs one announce needs.
    #[must_use]
    pub fn announce_policy(&self) -> AnnouncePolicy {
        AnnouncePolicy {
            min_interval: swarm::MIN_INTERVAL,
            max_handouts: self.max_handouts_per_interval.load(Ordering::Relaxed),
            enforce_dna_only: self.swarm_enforce_dna_only.load(Ordering::Relaxed),
            dna_only_prefix: self
                .swarm_dna_only_prefix
                .read()
                .expect("it should lock the variable cell")
                .as_bytes()
                .to_vec(),
            strategy: *self
                .peer_selection_algorithm
                .read()
                .expect("it should lock the variable cell"),
        }
    }
}

/// The CPU usage sample the external sampler refreshes. Handlers read it for
/// the `X-CPU` header, the ranking job folds it into per-swarm load shares.
#[derive(Clone, Default)]
pub struct CpuSample {
    value: Arc<Mutex<f64>>,
}

impl CpuSample {
    pub fn set(&self, percent: f64) {
        *self.value.lock().expect("it should lock the sample") = percent;
    }

    #[must_use]
    pub fn get(&self) -> f64 {
        *self.value.lock().expect("it should lock the sample")
    }
}

/// Data returned by a `scrape` request: swarm metadata for every queried
/// info hash the tracker knows. Unknown info hashes are omitted.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct ScrapeData {
    pub files: HashMap<InfoHash, SwarmMetadata>,
}

impl ScrapeData {
    #[must_use]
    pub fn empty() -> Self {
        Self { files: HashMap::new() }
    }

    pub fn add_file(&mut self, info_hash: &InfoHash, metadata: SwarmMetadata) {
        self.files.insert(*info_hash, metadata);
    }
}

/// The domain layer tracker service.
pub struct Tracker {
    pub swarms: Swarms,
    pub settings: Arc<RuntimeSettings>,
    pub controls: ControlRegistry,
    pub blacklist: Arc<Blacklist>,
    pub natcheck: natcheck::Service,
    stats_event_sender: Option<statistics::Sender>,
    stats_repository: statistics::Repo,
    pub cpu: CpuSample,
    /// Identifies this tracker instance in the `X-Server` header.
    pub tracker_id: String,
}

impl Tracker {
    /// Builds the tracker and its NAT check service. The returned receiver
    /// yields verified endpoints and must be drained by a listener task that
    /// calls [`Tracker::apply_verified`].
    #[must_use]
    pub fn new(
        stats_event_sender: Option<statistics::Sender>,
        stats_repository: statistics::Repo,
        tracker_id: String,
    ) -> (Self, mpsc::Receiver<Verified>) {
        let settings = Arc::new(RuntimeSettings::default());
        let mut controls = ControlRegistry::default();
        settings.register(&mut controls);

        let (natcheck, verified_rx) = natcheck::Service::new();

        (
            Self {
                swarms: Swarms::default(),
                settings,
                controls,
                blacklist: Arc::new(Blacklist::default()),
                natcheck,
                stats_event_sender,
                stats_repository,
                cpu: CpuSample::default(),
                tracker_id,
            },
            verified_rx,
        )
    }

    pub async fn send_stats_event(&self, event: statistics::Event) {
        if let Some(sender) = &self.stats_event_sender {
            sender.send_event(event).await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &statistics::Repo {
        &self.stats_repository
    }

    /// Token and blacklist checks that gate an announce before any swarm
    /// state is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadNotAuthorized`] when enforcement is on and
    /// the check fails. The same reply covers both checks so clients cannot
    /// distinguish a bad token from a blacklisted torrent.
    pub fn authorize_announce(
        &self,
        info_hash: &InfoHash,
        tid: &[u8],
        tid_hash: &InfoHash,
        auth_token: Option<&str>,
    ) -> Result<(), Error> {
        if self.settings.enforce_auth_token.load(Ordering::Relaxed) {
            let secret = self
                .settings
                .secret_auth_token
                .read()
                .expect("it should lock the variable cell")
                .clone();
            let passed = auth_token.is_some_and(|token| auth::verify_token(info_hash, tid, &secret, token));
            if !passed {
                return Err(Error::DownloadNotAuthorized {
                    location: Location::caller(),
                });
            }
        }

        if self.settings.enforce_db_blacklist.load(Ordering::Relaxed) && !self.blacklist.is_allowed(tid_hash) {
            return Err(Error::DownloadNotAuthorized {
                location: Location::caller(),
            });
        }

        Ok(())
    }

    /// Finds or lazily creates the swarm for an authorized announce.
    #[must_use]
    pub fn swarm_for_announce(&self, info_hash: &InfoHash) -> SharedSwarm {
        self.swarms
            .get_or_create(info_hash, self.settings.swarm_default_dna_only.load(Ordering::Relaxed))
    }

    /// Queues NAT checks for the endpoints an announce claimed.
    pub fn launch_nat_checks(
        &self,
        info_hash: InfoHash,
        peer_id: helix_tracker_primitives::peer::Id,
        addrs: &[std::net::SocketAddr],
    ) {
        for addr in addrs {
            self.natcheck.enqueue(natcheck::Check {
                info_hash,
                peer_id,
                addr: *addr,
            });
        }
    }

    /// Applies a passed NAT check. A no-op if the peer has gone away in the
    /// meantime.
    pub fn apply_verified(&self, verified: &Verified) {
        if let Some(shared) = self.swarms.get(&verified.info_hash) {
            let mut swarm = shared.lock().expect("it should lock the swarm");
            swarm.add_peer_endpoint(&verified.peer_id, verified.addr);
        }
    }

    /// It handles a scrape request.
    #[must_use]
    pub fn scrape(&self, info_hashes: &[InfoHash]) -> ScrapeData {
        let mut scrape_data = ScrapeData::empty();

        for info_hash in info_hashes {
            if let Some(shared) = self.swarms.get(info_hash) {
                let swarm = shared.lock().expect("it should lock the swarm");
                scrape_data.add_file(info_hash, swarm.metadata());
            }
        }

        scrape_data
    }

    /// Evicts peers that have not checked in for longer than
    /// `INTERVAL + INTERVAL/10` seconds. Returns how many were removed.
    pub fn scan_for_stale_peers(&self) -> usize {
        let now = CurrentClock::now_secs();
        let max_age = INTERVAL + INTERVAL / 10;

        let mut removed = 0;
        self.swarms.for_each(|swarm| {
            removed += swarm.timeout_peers(now, max_age);
        });

        if removed > 0 {
            info!("timed out {} peers", removed);
        }
        removed
    }

    /// Total peers across all swarms, seeders included.
    #[must_use]
    pub fn total_peers(&self) -> u64 {
        let mut total: u64 = 0;
        self.swarms.for_each(|swarm| {
            total += (swarm.num_peers() + swarm.num_seeds()) as u64;
        });
        total
    }

    /// Ranks every swarm by its load metric (descending) and attributes a
    /// share of the sampled CPU usage to each.
    #[allow(clippy::cast_precision_loss)]
    pub fn rank_swarms(&self) {
        let cpu_percent = self.cpu.get();

        let mut load_list: Vec<(usize, SharedSwarm)> = self
            .swarms
            .all()
            .into_iter()
            .map(|shared| {
                let load = shared.lock().expect("it should lock the swarm").load_metric();
                (load, shared)
            })
            .collect();

        load_list.sort_by(|a, b| b.0.cmp(&a.0));

        let load_total: usize = load_list.iter().map(|(load, _)| load).sum();

        for (rank, (load, shared)) in load_list.iter().enumerate() {
            let mut swarm = shared.lock().expect("it should lock the swarm");
            let load_frac = if load_total == 0 {
                0.0
            } else {
                *load as f64 / load_total as f64
            };
            swarm.set_rank(rank);
            swarm.set_cpu_load(load_frac * cpu_percent);
        }
    }

    /// The info hashes of all swarms currently flagged DISABLED.
    #[must_use]
    pub fn torrent_blacklist(&self) -> Vec<InfoHash> {
        let mut disabled = Vec::new();
        self.swarms.for_each(|swarm| {
            if swarm.is_disabled() {
                disabled.push(swarm.info_hash());
            }
        });
        disabled
    }

    /// Enables or disables a swarm. Returns `false` when no such swarm is
    /// known.
    pub fn set_swarm_enabled(&self, info_hash: &InfoHash, enabled: bool) -> bool {
        let Some(shared) = self.swarms.get(info_hash) else {
            return false;
        };
        let mut swarm = shared.lock().expect("it should lock the swarm");
        if enabled {
            info!("unblacklisting {}", info_hash);
            swarm.enable();
        } else {
            info!("blacklisting {}", info_hash);
            swarm.disable();
        }
        true
    }

    /// The text dump served by `/statistics`.
    #[must_use]
    pub async fn statistics_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Current time: {}\n", CurrentClock::now_secs()));

        out.push_str(&self.natcheck.metrics().report(self.natcheck.now_micros()));

        let load = self.stats_repository.get_load_snapshot().await;
        let metrics = self.stats_repository.get_metrics().await;
        out.push_str(&format!("Helix statistics for period ending: {}\n", load.period_end));
        out.push_str(&format!("Helix QPS: {}\n", load.qps));
        out.push_str(&format!("Helix number of swarms: {}\n", load.num_swarms));
        out.push_str(&format!("Helix number of peers: {}\n", load.num_peers));
        out.push_str(&format!("Helix CPU percentage: {:.2}\n", load.cpu_percent));
        out.push_str(&format!("Helix requests: {}\n", metrics.total_requests));
        out.push_str(&format!("Endpoint announce4 handled: {}\n", metrics.tcp4_announces_handled));
        out.push_str(&format!("Endpoint announce6 handled: {}\n", metrics.tcp6_announces_handled));
        out.push_str(&format!("Endpoint scrape4 handled: {}\n", metrics.tcp4_scrapes_handled));
        out.push_str(&format!("Endpoint scrape6 handled: {}\n", metrics.tcp6_scrapes_handled));
        out.push_str(&format!("Swarm peers delivered: {}\n", metrics.peers_delivered));
        out.push_str(&format!("Swarm peers created: {}\n", metrics.peers_created));

        out
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use helix_tracker_primitives::announce_event::AnnounceEvent;
    use helix_tracker_primitives::info_hash::InfoHash;
    use helix_tracker_primitives::peer::Id;
    use helix_tracker_primitives::report::ClientReport;

    use super::natcheck::Verified;
    use super::statistics;
    use super::Tracker;

    fn tracker() -> Tracker {
        let (tracker, _verified_rx) = Tracker::new(None, statistics::Repo::new(), "00000000AAAA".to_string());
        tracker
    }

    fn join(tracker: &Tracker, info_hash: InfoHash, peer_id: Id, addr: SocketAddr, left: u64) {
        let shared = tracker.swarm_for_announce(&info_hash);
        let mut swarm = shared.lock().unwrap();
        let report = ClientReport {
            left,
            event: AnnounceEvent::Started,
            ..ClientReport::default()
        };
        let outcome = match addr {
            SocketAddr::V4(v4) => swarm
                .handle_announce(
                    peer_id,
                    Some(*v4.ip()),
                    v4.port(),
                    None,
                    v4.port(),
                    50,
                    &report,
                    false,
                    &tracker.settings.announce_policy(),
                    1000,
                )
                .unwrap(),
            SocketAddr::V6(_) => unreachable!("tests announce over IPv4"),
        };
        drop(swarm);
        for check in outcome.nat_checks {
            tracker.apply_verified(&Verified {
                info_hash,
                peer_id,
                addr: check,
            });
        }
    }

    #[test]
    fn authorization_passes_by_default_and_fails_closed_for_blacklisted_tids() {
        let tracker = tracker();
        let info_hash = InfoHash([1; 20]);

        assert!(tracker
            .authorize_announce(&info_hash, &info_hash.bytes(), &info_hash, None)
            .is_ok());

        tracker.blacklist.apply_rows(&[(info_hash, false)]);
        assert!(tracker
            .authorize_announce(&info_hash, &info_hash.bytes(), &info_hash, None)
            .is_err());
    }

    #[test]
    fn auth_token_enforcement_accepts_only_the_computed_token() {
        use std::sync::atomic::Ordering;

        let tracker = tracker();
        let info_hash = InfoHash([1; 20]);
        tracker.settings.enforce_auth_token.store(true, Ordering::Relaxed);

        assert!(tracker
            .authorize_announce(&info_hash, &info_hash.bytes(), &info_hash, None)
            .is_err());
        assert!(tracker
            .authorize_announce(&info_hash, &info_hash.bytes(), &info_hash, Some("wrong"))
            .is_err());

        let token = super::auth::expected_token(&info_hash, &info_hash.bytes(), "sekret");
        assert!(tracker
            .authorize_announce(&info_hash, &info_hash.bytes(), &info_hash, Some(&token))
            .is_ok());
    }

    #[test]
    fn scrape_returns_entries_for_every_known_hash_and_omits_unknown_ones() {
        let tracker = tracker();
        let first = InfoHash([1; 20]);
        let second = InfoHash([2; 20]);
        let unknown = InfoHash([3; 20]);
        join(&tracker, first, Id([1; 20]), "10.0.0.1:6881".parse().unwrap(), 0);
        join(&tracker, second, Id([2; 20]), "10.0.0.2:6881".parse().unwrap(), 100);

        let scrape_data = tracker.scrape(&[first, second, unknown]);

        assert_eq!(scrape_data.files.len(), 2);
        assert_eq!(scrape_data.files[&first].complete, 1);
        assert_eq!(scrape_data.files[&second].incomplete, 1);
        assert_eq!(scrape_data.files[&second].downloaders, 1);
        assert!(!scrape_data.files.contains_key(&unknown));
    }

    #[test]
    fn a_verified_endpoint_for_an_unknown_swarm_is_dropped() {
        let tracker = tracker();

        tracker.apply_verified(&Verified {
            info_hash: InfoHash([9; 20]),
            peer_id: Id([9; 20]),
            addr: "10.0.0.9:6881".parse().unwrap(),
        });

        assert!(tracker.swarms.is_empty());
    }

    #[test]
    fn ranking_orders_swarms_by_peer_count() {
        let tracker = tracker();
        let big = InfoHash([1; 20]);
        let small = InfoHash([2; 20]);
        for n in 1..=3 {
            join(&tracker, big, Id([n; 20]), format!("10.0.0.{n}:6881").parse().unwrap(), 100);
        }
        join(&tracker, small, Id([10; 20]), "10.0.1.1:6881".parse().unwrap(), 100);
        tracker.cpu.set(50.0);

        tracker.rank_swarms();

        let big_swarm = tracker.swarms.get(&big).unwrap();
        let small_swarm = tracker.swarms.get(&small).unwrap();
        assert_eq!(big_swarm.lock().unwrap().rank(), 0);
        assert_eq!(small_swarm.lock().unwrap().rank(), 1);
        let share = big_swarm.lock().unwrap().cpu_load();
        assert!((share - 37.5).abs() < 1e-9, "expected 3/4 of 50%, got {share}");
    }

    #[test]
    fn the_torrent_blacklist_lists_exactly_the_disabled_swarms() {
        let tracker = tracker();
        let disabled = InfoHash([1; 20]);
        let enabled = InfoHash([2; 20]);
        tracker.swarm_for_announce(&disabled);
        tracker.swarm_for_announce(&enabled);

        assert!(tracker.set_swarm_enabled(&disabled, false));
        assert!(!tracker.set_swarm_enabled(&InfoHash([9; 20]), false));

        assert_eq!(tracker.torrent_blacklist(), vec![disabled]);

        assert!(tracker.set_swarm_enabled(&disabled, true));
        assert!(tracker.torrent_blacklist().is_empty());
    }

    #[tokio::test]
    async fn the_statistics_report_contains_every_counter_block() {
        let tracker = tracker();

        let report = tracker.statistics_report().await;

        assert!(report.starts_with("Current time: "));
        assert!(report.contains("NatCheck created: 0"));
        assert!(report.contains("NatCheck queue length: 0"));
        assert!(report.contains("Helix QPS: 0"));
        assert!(report.contains("Helix requests: 0"));
        assert!(report.contains("Endpoint announce4 handled: 0"));
        assert!(report.contains("Swarm peers delivered: 0"));
    }

    #[test]
    fn stale_peers_are_scanned_out_of_every_swarm() {
        use helix_tracker_clock::clock::stopped::Stopped as _;
        use helix_tracker_clock::clock::Stopped;

        let tracker = tracker();
        let info_hash = InfoHash([1; 20]);
        join(&tracker, info_hash, Id([1; 20]), "10.0.0.1:6881".parse().unwrap(), 100);

        // the peer checked in at t=1000; jump far past the expiry
        Stopped::local_set(&std::time::Duration::from_secs(1000 + super::INTERVAL + super::INTERVAL / 10 + 1));
        let removed = tracker.scan_for_stale_peers();

        assert_eq!(removed, 1);
        assert_eq!(tracker.total_peers(), 0);
        Stopped::local_reset();
    }
}
