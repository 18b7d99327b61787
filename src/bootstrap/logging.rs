//! Setup for the application logging.
//!
//! Logs go to stdout, or to the log file given on the command line. The
//! `--verbose` flag raises the level to `debug`.
use std::path::Path;
use std::sync::{Arc, Once};

use tracing::level_filters::LevelFilter;
use tracing::info;

static INIT: Once = Once::new();

pub fn setup(verbose: bool, logfile: Option<&Path>) {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    INIT.call_once(|| {
        match logfile {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .expect("the log file should be writable");
                tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .init();
            }
            None => {
                tracing_subscriber::fmt().with_max_level(level).init();
            }
        }

        info!("logging initialized.");
    });
}
