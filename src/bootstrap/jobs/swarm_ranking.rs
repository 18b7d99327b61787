//! Job that keeps the per-swarm load ranking fresh and emits the periodic
//! statistics line.
//!
//! The ranking runs every second so the `X-Swarm-Rank`/`X-Swarm-CPU`
//! headers stay current under churn; the QPS window is refreshed roughly
//! every fifteen seconds.
use std::sync::Arc;
use std::time::Duration;

use helix_tracker_clock::clock::Time;
use tokio::task::JoinHandle;
use tracing::info;

use crate::core::statistics::LoadSnapshot;
use crate::core::Tracker;
use crate::CurrentClock;

const RANKING_TICK: Duration = Duration::from_secs(1);
const STATS_WINDOW_SECS: u64 = 15;

/// It starts the ranking and statistics job.
#[must_use]
pub fn start_job(tracker: &Arc<Tracker>) -> JoinHandle<()> {
    let weak_tracker = Arc::downgrade(tracker);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RANKING_TICK);
        let mut window_start = CurrentClock::now_secs();
        let mut prev_total_requests: u64 = 0;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping swarm ranking..");
                    break;
                }
                _ = interval.tick() => {
                    let Some(tracker) = weak_tracker.upgrade() else { break };

                    tracker.rank_swarms();

                    let now = CurrentClock::now_secs();
                    let elapsed = now.saturating_sub(window_start);
                    if elapsed > STATS_WINDOW_SECS {
                        let total_requests = tracker.stats().get_metrics().await.total_requests;
                        #[allow(clippy::cast_precision_loss)]
                        let qps = (total_requests - prev_total_requests) as f64 / elapsed as f64;
                        let num_swarms = tracker.swarms.len() as u64;
                        let num_peers = tracker.total_peers();
                        let cpu_percent = tracker.cpu.get();

                        tracker
                            .stats()
                            .set_load_snapshot(LoadSnapshot {
                                qps,
                                num_swarms,
                                num_peers,
                                cpu_percent,
                                period_end: now,
                            })
                            .await;

                        info!(
                            "*** {:>6.1}qps; {:>6} swarms; {:>7} peers; {:>5.2} %cpu ***",
                            qps, num_swarms, num_peers, cpu_percent
                        );

                        window_start = now;
                        prev_total_requests = total_requests;
                    }
                }
            }
        }
    })
}
