//! The background jobs the tracker runs next to the request pipeline.
//!
//! Every job is an independent tokio task. Interval jobs watch `ctrl_c`
//! themselves and hold only a weak reference to the tracker where possible,
//! so they wind down when the application does.
pub mod blacklist_updater;
pub mod checkpoint_saver;
pub mod http_tracker;
pub mod natcheck_listener;
pub mod peer_timeout;
pub mod swarm_ranking;
