use std::path::PathBuf;

use clap::Parser;
use helix_tracker::app;
use helix_tracker::bootstrap::app::{setup, Options};
use helix_tracker::bootstrap::jobs::checkpoint_saver;
use helix_tracker::servers::signals::global_shutdown_signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "helix-tracker", about = "A BitTorrent HTTP tracker", version)]
struct Args {
    /// The listening port.
    port: u16,

    /// Run as a daemon (delegated to the service manager).
    #[arg(long, default_value_t = false)]
    daemon: bool,

    /// Print verbose logs.
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// When running as a daemon, run as this user.
    #[arg(long)]
    username: Option<String>,

    /// When running as a daemon, run as this group.
    #[arg(long)]
    groupname: Option<String>,

    /// Write the process id to this file on startup.
    #[arg(long)]
    pidfile: Option<PathBuf>,

    /// Log messages to this file.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// The number of minutes between checkpointing the tracker state.
    #[arg(long = "checkpoint-time", default_value_t = 5)]
    checkpoint_time: u64,

    /// Load configuration values from this file.
    #[arg(long)]
    configfile: Option<PathBuf>,
}

impl From<Args> for Options {
    fn from(args: Args) -> Self {
        Options {
            port: args.port,
            daemon: args.daemon,
            verbose: args.verbose,
            username: args.username,
            groupname: args.groupname,
            pidfile: args.pidfile,
            logfile: args.logfile,
            checkpoint_time: args.checkpoint_time,
            configfile: args.configfile,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::try_parse().unwrap_or_else(|parse_error| {
        let _ = parse_error.print();
        std::process::exit(1);
    });
    let options: Options = args.into();

    let (tracker, verified_rx) = setup(&options);

    let running = app::start(&options, &tracker, verified_rx)?;

    global_shutdown_signal().await;
    info!("helix-tracker {} exiting on signal", tracker.tracker_id);

    // a final snapshot so a clean shutdown loses nothing
    checkpoint_saver::save(&tracker);

    running.shutdown().await;

    Ok(())
}
