//! Per-swarm request and peer counters.
use helix_tracker_primitives::announce_event::AnnounceEvent;
use helix_tracker_primitives::report::ClientReport;

/// Counters a swarm accumulates from the reports of its peers. Coarse peer
/// and seed totals are tracked here as well so scrape never has to walk the
/// peer map.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwarmStats {
    pub peers: i64,
    pub seeds: i64,
    pub w_downloaded: u64,
    pub p_downloaded: u64,
    pub p_uploaded: u64,
    pub c_bytes: u64,
    pub w_bad: u64,
    pub cumulative_w_bad: u64,
    pub w_fail: u64,
    pub starts: u64,
    pub completes: u64,
    pub stops: u64,
    pub timeouts: u64,
}

impl SwarmStats {
    pub fn update_peer_counts(&mut self, d_peers: i64, d_seeds: i64) {
        self.peers += d_peers;
        self.seeds += d_seeds;
    }

    pub fn log_request(&mut self, report: &ClientReport) {
        self.w_downloaded += report.w_downloaded;
        self.p_downloaded += report.p_downloaded;
        self.p_uploaded += report.p_uploaded;
        self.c_bytes += report.c_bytes;

        self.w_bad += report.w_bad;
        self.cumulative_w_bad += report.w_bad;
        self.w_fail += report.w_fail;

        match report.event {
            AnnounceEvent::Started => self.starts += 1,
            AnnounceEvent::Completed => self.completes += 1,
            AnnounceEvent::Stopped => self.stops += 1,
            _ => {}
        }
    }

    pub fn add_timeout(&mut self) {
        self.timeouts += 1;
    }
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::announce_event::AnnounceEvent;
    use helix_tracker_primitives::report::ClientReport;

    use super::SwarmStats;

    #[test]
    fn it_should_accumulate_transfer_counters_and_event_counts() {
        let mut stats = SwarmStats::default();

        stats.log_request(&ClientReport {
            event: AnnounceEvent::Completed,
            w_bad: 3,
            p_uploaded: 100,
            ..ClientReport::default()
        });
        stats.log_request(&ClientReport {
            event: AnnounceEvent::Stopped,
            w_bad: 1,
            ..ClientReport::default()
        });

        assert_eq!(stats.completes, 1);
        assert_eq!(stats.stops, 1);
        assert_eq!(stats.w_bad, 4);
        assert_eq!(stats.cumulative_w_bad, 4);
        assert_eq!(stats.p_uploaded, 100);
    }
}
