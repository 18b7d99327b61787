//! Job that applies NAT check completions to the swarm tables.
//!
//! Completions arrive over the channel the NAT check service writes to;
//! applying one is a no-op when the peer has been removed in the meantime,
//! so a late completion can never resurrect state.
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::natcheck::Verified;
use crate::core::Tracker;

/// It starts the job that drains verified endpoints into the tracker.
#[must_use]
pub fn start_job(tracker: Arc<Tracker>, mut verified_rx: mpsc::Receiver<Verified>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(verified) = verified_rx.recv().await {
            tracker.apply_verified(&verified);
        }
    })
}
