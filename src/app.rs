//! Helix tracker application.
//!
//! When the application starts it binds the dual-stack listeners and spins
//! up a set of independent jobs:
//!
//! - The NAT check completion listener.
//! - The peer timeout scanner.
//! - The checkpoint saver.
//! - The swarm ranking and statistics job.
//! - The external blacklist updater.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::bail;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bootstrap::app::Options;
use crate::bootstrap::jobs::{
    blacklist_updater, checkpoint_saver, http_tracker, natcheck_listener, peer_timeout, swarm_ranking,
};
use crate::core::natcheck::Verified;
use crate::core::Tracker;
use crate::servers::http::server::RunningServer;

/// Everything [`start`] launched, so the main task can wind it down.
pub struct Running {
    pub servers: Vec<RunningServer>,
    pub jobs: Vec<JoinHandle<()>>,
}

impl Running {
    /// Stops the listeners gracefully and aborts the interval jobs.
    pub async fn shutdown(self) {
        for server in self.servers {
            server.stop().await;
        }
        for job in self.jobs {
            job.abort();
        }
    }
}

/// Binds the listeners and starts every job.
///
/// # Errors
///
/// Fails when no listening address could be bound at all. A partial bind
/// (for example on a host without IPv6) is logged and tolerated.
pub fn start(options: &Options, tracker: &Arc<Tracker>, verified_rx: mpsc::Receiver<Verified>) -> anyhow::Result<Running> {
    let mut servers = Vec::new();
    let bind_addresses = [
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), options.port),
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), options.port),
    ];
    for bind_to in bind_addresses {
        if let Some(running) = http_tracker::start_job(tracker.clone(), bind_to) {
            servers.push(running);
        }
    }
    if servers.is_empty() {
        bail!("could not bind any listening address on port {}", options.port);
    }

    let jobs = vec![
        natcheck_listener::start_job(tracker.clone(), verified_rx),
        peer_timeout::start_job(tracker),
        checkpoint_saver::start_job(tracker, options.checkpoint_time),
        swarm_ranking::start_job(tracker),
        blacklist_updater::start_job(tracker),
    ];

    Ok(Running { servers, jobs })
}
