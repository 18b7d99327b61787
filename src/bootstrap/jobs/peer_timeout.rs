//! Job that evicts peers whose last check-in has gone stale.
//!
//! Peers are expected to announce every `INTERVAL` seconds; the scanner
//! runs twice per interval and removes everyone older than
//! `INTERVAL + INTERVAL/10`.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::core::swarm::INTERVAL;
use crate::core::Tracker;

/// It starts the job that scans all swarms for timed out peers.
#[must_use]
pub fn start_job(tracker: &Arc<Tracker>) -> JoinHandle<()> {
    let weak_tracker = Arc::downgrade(tracker);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(INTERVAL / 2));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping peer timeout scanner..");
                    break;
                }
                _ = interval.tick() => {
                    if let Some(tracker) = weak_tracker.upgrade() {
                        tracker.scan_for_stale_peers();
                    } else {
                        break;
                    }
                }
            }
        }
    })
}
