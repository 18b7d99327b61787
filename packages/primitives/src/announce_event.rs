//! The event the peer is reporting in an `announce` request.
use serde::{Deserialize, Serialize};

/// Announce events. `None` (the empty string on the wire) is the regular
/// periodic check-in.
#[derive(Serialize, Deserialize, Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AnnounceEvent {
    /// The peer has just started downloading.
    Started,
    /// The peer has ceased downloading.
    Stopped,
    /// The peer has completed the download.
    Completed,
    /// The peer keeps the torrent but is not transferring.
    Paused,
    /// A regular periodic check-in.
    #[default]
    None,
}

impl AnnounceEvent {
    #[must_use]
    pub fn from_i32(i: i32) -> Self {
        match i {
            1 => Self::Completed,
            2 => Self::Started,
            3 => Self::Stopped,
            4 => Self::Paused,
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn to_i32(&self) -> i32 {
        match self {
            AnnounceEvent::None => 0,
            AnnounceEvent::Completed => 1,
            AnnounceEvent::Started => 2,
            AnnounceEvent::Stopped => 3,
            AnnounceEvent::Paused => 4,
        }
    }
}
