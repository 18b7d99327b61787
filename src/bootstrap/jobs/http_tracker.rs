//! Job that starts one HTTP tracker listener.
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::error;

use crate::core::Tracker;
use crate::servers::http::server::{self, RunningServer};

/// Binds and serves one listening address. Returns `None` when the bind
/// fails; the caller decides whether the remaining addresses are enough.
#[must_use]
pub fn start_job(tracker: Arc<Tracker>, bind_to: SocketAddr) -> Option<RunningServer> {
    match server::start(tracker, bind_to) {
        Ok(running) => Some(running),
        Err(io_error) => {
            error!("could not bind HTTP tracker to {}: {}", bind_to, io_error);
            None
        }
    }
}
