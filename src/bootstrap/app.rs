//! Setup for the main tracker application.
//!
//! [`setup`] only builds the application and its dependencies; starting the
//! jobs is [`app::start`](crate::app::start)'s business.
//!
//! Setup steps:
//!
//! 1. Initialize logging.
//! 2. Build the statistics keeper and the domain tracker.
//! 3. Apply the config file to the control registry.
//! 4. Restore the swarm table from the checkpoint file.
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::logging;
use crate::core::natcheck::Verified;
use crate::core::{checkpoint, statistics, Tracker};

/// The command line options after parsing.
#[derive(Debug, Clone)]
pub struct Options {
    pub port: u16,
    pub daemon: bool,
    pub verbose: bool,
    pub username: Option<String>,
    pub groupname: Option<String>,
    pub pidfile: Option<PathBuf>,
    pub logfile: Option<PathBuf>,
    /// Minutes between state checkpoints.
    pub checkpoint_time: u64,
    pub configfile: Option<PathBuf>,
}

/// The id this instance reports in the `X-Server` header: the bound IPv4
/// address and port, packed as hex. Wide enough to stay unique if the id
/// ever grows more parts.
#[must_use]
pub fn tracker_id(bind_ip: Ipv4Addr, port: u16) -> String {
    format!("{:08X}{:04X}", u32::from(bind_ip), port)
}

/// It initializes the application with the given options.
///
/// Returns the tracker and the NAT check completion stream that
/// [`app::start`](crate::app::start) hands to the listener job.
#[must_use]
pub fn setup(options: &Options) -> (Arc<Tracker>, mpsc::Receiver<Verified>) {
    logging::setup(options.verbose, options.logfile.as_deref());

    if options.daemon {
        warn!("daemon mode is delegated to the service manager; continuing in the foreground");
    }
    if let Some(pidfile) = &options.pidfile {
        if let Err(io_error) = std::fs::write(pidfile, format!("{}\n", std::process::id())) {
            error!("could not write pidfile {}: {}", pidfile.display(), io_error);
        }
    }

    let (stats_event_sender, stats_repository) = statistics::Keeper::new_active_instance();

    let id = tracker_id(Ipv4Addr::UNSPECIFIED, options.port);
    info!("Trackerid: [{}]", id);

    let (tracker, verified_rx) = Tracker::new(Some(stats_event_sender), stats_repository, id);

    if let Some(configfile) = &options.configfile {
        if tracker.controls.read_file(configfile) {
            info!("Config loaded from {}", configfile.display());
        } else {
            error!("Errors loading config from {}", configfile.display());
        }
    }

    let default_dna_only = tracker.settings.swarm_default_dna_only.load(Ordering::Relaxed);
    if let Err(io_error) = checkpoint::load_from_file(
        Path::new(checkpoint::CHECKPOINT_FILE),
        &tracker.swarms,
        default_dna_only,
    ) {
        error!("could not read the checkpoint file: {}", io_error);
    }

    (Arc::new(tracker), verified_rx)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::tracker_id;

    #[test]
    fn the_tracker_id_packs_the_address_and_port_as_hex() {
        assert_eq!(tracker_id(Ipv4Addr::new(0, 0, 0, 0), 6969), "000000001B39");
        assert_eq!(tracker_id(Ipv4Addr::new(10, 0, 0, 1), 0x1AE1), "0A0000011AE1");
    }
}
