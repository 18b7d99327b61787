//! Errors returned by the core tracker. The display forms are the exact
//! `failure reason` strings sent to clients.
use std::panic::Location;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Requested download is not authorized for use with this tracker.")]
    DownloadNotAuthorized { location: &'static Location<'static> },

    #[error("Swarm is blacklisted.")]
    SwarmBlacklisted { location: &'static Location<'static> },
}
