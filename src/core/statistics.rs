//! Structs to collect and keep tracker metrics.
//!
//! The data is collected with an `event sender -> event listener` model: the
//! delivery layer sends an [`Event`] for every request it serves and the
//! [`Keeper`] task folds the events into the [`Repo`].
use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, RwLock, RwLockReadGuard};

const CHANNEL_BUFFER_SIZE: usize = 65_535;

/// A statistics event.
///
/// - `Tcp` prefix: the request came over the HTTP tracker.
/// - `4`/`6`: the IP version of the requesting peer.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Tcp4Announce,
    Tcp4Scrape,
    Tcp6Announce,
    Tcp6Scrape,
    /// New peer entries created by announces.
    PeersCreated(u64),
    /// Endpoints emitted into announce responses.
    PeersDelivered(u64),
}

/// Request and swarm counters kept by the tracker.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Metrics {
    pub tcp4_announces_handled: u64,
    pub tcp4_scrapes_handled: u64,
    pub tcp6_announces_handled: u64,
    pub tcp6_scrapes_handled: u64,
    /// Every announce or scrape, any family.
    pub total_requests: u64,
    pub peers_created: u64,
    pub peers_delivered: u64,
}

/// The snapshot the ranking job refreshes on its statistics window. This is
/// what `/statistics` reports for the load figures.
#[derive(Debug, PartialEq, Default, Clone, Copy)]
pub struct LoadSnapshot {
    pub qps: f64,
    pub num_swarms: u64,
    pub num_peers: u64,
    pub cpu_percent: f64,
    /// Unix seconds when the reporting period ended.
    pub period_end: u64,
}

/// The service responsible for keeping tracker metrics: it listens to
/// statistics events and updates the counters accordingly.
pub struct Keeper {
    pub repository: Repo,
}

impl Default for Keeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Keeper {
    #[must_use]
    pub fn new() -> Self {
        Self { repository: Repo::new() }
    }

    #[must_use]
    pub fn new_active_instance() -> (Sender, Repo) {
        let mut keeper = Self::new();

        let sender = keeper.run_event_listener();

        (sender, keeper.repository)
    }

    pub fn run_event_listener(&mut self) -> Sender {
        let (sender, receiver) = mpsc::channel::<Event>(CHANNEL_BUFFER_SIZE);

        let repo = self.repository.clone();

        tokio::spawn(async move { event_listener(receiver, repo).await });

        Sender { sender }
    }
}

async fn event_listener(mut receiver: mpsc::Receiver<Event>, repo: Repo) {
    while let Some(event) = receiver.recv().await {
        event_handler(event, &repo).await;
    }
}

async fn event_handler(event: Event, repo: &Repo) {
    let mut metrics = repo.metrics.write().await;
    match event {
        Event::Tcp4Announce => {
            metrics.tcp4_announces_handled += 1;
            metrics.total_requests += 1;
        }
        Event::Tcp4Scrape => {
            metrics.tcp4_scrapes_handled += 1;
            metrics.total_requests += 1;
        }
        Event::Tcp6Announce => {
            metrics.tcp6_announces_handled += 1;
            metrics.total_requests += 1;
        }
        Event::Tcp6Scrape => {
            metrics.tcp6_scrapes_handled += 1;
            metrics.total_requests += 1;
        }
        Event::PeersCreated(count) => metrics.peers_created += count,
        Event::PeersDelivered(count) => metrics.peers_delivered += count,
    }
    drop(metrics);
}

/// Sends statistics events to the keeper.
#[derive(Clone)]
pub struct Sender {
    sender: mpsc::Sender<Event>,
}

impl Sender {
    pub async fn send_event(&self, event: Event) -> Option<Result<(), SendError<Event>>> {
        Some(self.sender.send(event).await)
    }
}

/// A repository for the tracker metrics.
#[derive(Clone)]
pub struct Repo {
    pub metrics: Arc<RwLock<Metrics>>,
    pub load: Arc<RwLock<LoadSnapshot>>,
}

impl Default for Repo {
    fn default() -> Self {
        Self::new()
    }
}

impl Repo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
            load: Arc::new(RwLock::new(LoadSnapshot::default())),
        }
    }

    pub async fn get_metrics(&self) -> RwLockReadGuard<'_, Metrics> {
        self.metrics.read().await
    }

    pub async fn get_load_snapshot(&self) -> LoadSnapshot {
        *self.load.read().await
    }

    pub async fn set_load_snapshot(&self, snapshot: LoadSnapshot) {
        *self.load.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, Keeper, Metrics};

    #[tokio::test]
    async fn events_update_the_request_counters() {
        let mut keeper = Keeper::new();
        let sender = keeper.run_event_listener();

        sender.send_event(Event::Tcp4Announce).await.unwrap().unwrap();
        sender.send_event(Event::Tcp6Scrape).await.unwrap().unwrap();
        sender.send_event(Event::PeersDelivered(7)).await.unwrap().unwrap();

        // the listener runs on another task; poll until it has drained
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if keeper.repository.get_metrics().await.total_requests == 2 {
                break;
            }
        }

        let metrics = keeper.repository.get_metrics().await;
        assert_eq!(
            *metrics,
            Metrics {
                tcp4_announces_handled: 1,
                tcp6_scrapes_handled: 1,
                total_requests: 2,
                peers_delivered: 7,
                ..Metrics::default()
            }
        );
    }
}
