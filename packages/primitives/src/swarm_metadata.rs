//! Aggregate swarm counters served by the `scrape` request.
use serde::Serialize;

/// Aggregate data for one swarm.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SwarmMetadata {
    /// Seeders: peers with the entire content.
    pub complete: u32,
    /// Leechers: peers still missing content (downloading or paused).
    pub incomplete: u32,
    /// The number of `completed` events the swarm has seen.
    pub downloaded: u32,
    /// Leechers that are actively downloading (not paused).
    pub downloaders: u32,
}

impl SwarmMetadata {
    #[must_use]
    pub fn zeroed() -> Self {
        Self::default()
    }
}
