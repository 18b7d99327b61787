//! Job that periodically rewrites the swarm state checkpoint.
//!
//! Writes are best effort: a failed write is logged and retried on the next
//! timer tick.
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::core::checkpoint;
use crate::core::Tracker;

/// It starts the job that saves the checkpoint every `checkpoint_minutes`.
#[must_use]
pub fn start_job(tracker: &Arc<Tracker>, checkpoint_minutes: u64) -> JoinHandle<()> {
    let weak_tracker = Arc::downgrade(tracker);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(checkpoint_minutes * 60));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping checkpoint saver..");
                    break;
                }
                _ = interval.tick() => {
                    let Some(tracker) = weak_tracker.upgrade() else { break };
                    save(&tracker);
                }
            }
        }
    })
}

/// One checkpoint rewrite. Also called on shutdown for a final snapshot.
pub fn save(tracker: &Arc<Tracker>) {
    let started = Instant::now();
    match checkpoint::save_to_file(Path::new(checkpoint::CHECKPOINT_FILE), &tracker.swarms) {
        Ok(bytes) => info!(
            "saved checkpoint {} swarms, {} bytes in {}ms",
            tracker.swarms.len(),
            bytes,
            started.elapsed().as_millis()
        ),
        Err(io_error) => error!("could not save checkpoint: {}", io_error),
    }
}
