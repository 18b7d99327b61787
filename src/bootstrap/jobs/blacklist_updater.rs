//! Job that polls the SQL source for the torrent blacklist.
//!
//! The SQL driver is synchronous, so each poll runs on the blocking thread
//! pool. A failed poll leaves the delta window untouched; the next one
//! retries the same rows.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::blacklist::Poller;
use crate::core::Tracker;

/// Seconds between polls of the blacklist source.
const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// It starts the blacklist polling job. The first poll runs right away.
#[must_use]
pub fn start_job(tracker: &Arc<Tracker>) -> JoinHandle<()> {
    let weak_tracker = Arc::downgrade(tracker);
    let poller = Arc::new(Poller::new(tracker.blacklist.clone(), tracker.settings.clone()));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping blacklist updater..");
                    break;
                }
                _ = interval.tick() => {
                    if weak_tracker.upgrade().is_none() {
                        break;
                    }
                    let poller = poller.clone();
                    let result = tokio::task::spawn_blocking(move || poller.refresh()).await;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(poll_error)) => warn!("blacklist poll failed: {}", poll_error),
                        Err(join_error) => warn!("blacklist poll task failed: {}", join_error),
                    }
                }
            }
        }
    })
}
