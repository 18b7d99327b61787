//! The external torrent blacklist.
//!
//! A background poller keeps an in-memory set of disabled torrent ids in
//! sync with a relational store. The set is read by every announce, so it is
//! guarded by a plain mutex taken only for point queries; the poller holds
//! it just long enough to fold one batch of rows in.
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use helix_tracker_primitives::info_hash::InfoHash;
use r2d2::Pool;
use r2d2_mysql::mysql::prelude::Queryable;
use r2d2_mysql::mysql::{Opts, OptsBuilder};
use r2d2_mysql::MySqlConnectionManager;
use thiserror::Error;
use tracing::{info, warn};

use super::RuntimeSettings;

/// How many pooled connections the poller may hold.
const MAX_CONNECTIONS: u32 = 4;

/// The set of torrent ids the tracker refuses to serve.
#[derive(Default)]
pub struct Blacklist {
    entries: Mutex<HashSet<InfoHash>>,
}

impl Blacklist {
    #[must_use]
    pub fn is_allowed(&self, tid: &InfoHash) -> bool {
        !self.entries.lock().expect("it should lock the blacklist").contains(tid)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("it should lock the blacklist").is_empty()
    }

    /// Folds one batch of `(tid, allowed)` rows into the set. Returns how
    /// many entries were added and removed.
    pub fn apply_rows(&self, rows: &[(InfoHash, bool)]) -> (usize, usize) {
        let mut added = 0;
        let mut removed = 0;

        let mut entries = self.entries.lock().expect("it should lock the blacklist");
        for (tid, allowed) in rows {
            if *allowed {
                if entries.remove(tid) {
                    removed += 1;
                }
            } else if entries.insert(*tid) {
                added += 1;
            }
        }
        drop(entries);

        (added, removed)
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("invalid database url: {0}")]
    Url(#[from] r2d2_mysql::mysql::UrlError),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("query failed: {0}")]
    Query(#[from] r2d2_mysql::mysql::Error),
}

/// Polls the SQL source and maintains the in-memory [`Blacklist`].
///
/// The delta window `last_time` only advances when a poll succeeds, so a
/// failed poll is retried over the same window. A failed poll also discards
/// the connection pool; connections are re-created lazily on the next run.
pub struct Poller {
    blacklist: Arc<Blacklist>,
    settings: Arc<RuntimeSettings>,
    pool: Mutex<Option<(String, Pool<MySqlConnectionManager>)>>,
    last_time: Mutex<NaiveDateTime>,
}

impl Poller {
    #[must_use]
    pub fn new(blacklist: Arc<Blacklist>, settings: Arc<RuntimeSettings>) -> Self {
        Self {
            blacklist,
            settings,
            pool: Mutex::new(None),
            last_time: Mutex::new(NaiveDateTime::UNIX_EPOCH),
        }
    }

    fn database_url(&self) -> String {
        let db = self.settings.mysql_db.read().expect("it should lock the variable cell");
        let host = self.settings.mysql_host.read().expect("it should lock the variable cell");
        let user = self.settings.mysql_user.read().expect("it should lock the variable cell");
        let password = self.settings.mysql_password.read().expect("it should lock the variable cell");
        let port = self.settings.mysql_port.load(Ordering::Relaxed);

        format!("mysql://{user}:{password}@{host}:{port}/{db}")
    }

    fn pool_for(&self, url: &str) -> Result<Pool<MySqlConnectionManager>, PollError> {
        let mut guard = self.pool.lock().expect("it should lock the pool slot");
        if let Some((pooled_url, pool)) = guard.as_ref() {
            if pooled_url == url {
                return Ok(pool.clone());
            }
        }

        let opts = Opts::from_url(url)?;
        let manager = MySqlConnectionManager::new(OptsBuilder::from_opts(opts));
        let pool = Pool::builder().max_size(MAX_CONNECTIONS).build_unchecked(manager);
        *guard = Some((url.to_string(), pool.clone()));
        Ok(pool)
    }

    fn discard_pool(&self) {
        *self.pool.lock().expect("it should lock the pool slot") = None;
    }

    /// Runs one poll: fetch the rows modified since the last successful
    /// poll and fold them into the blacklist.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error. The delta window is not
    /// advanced, so the next poll covers the same rows again.
    pub fn refresh(&self) -> Result<(), PollError> {
        let url = self.database_url();
        let pool = self.pool_for(&url)?;

        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(pool_error) => {
                self.discard_pool();
                return Err(pool_error.into());
            }
        };

        let query_start = chrono::Utc::now().naive_utc();
        let window_start = *self.last_time.lock().expect("it should lock the window");
        let last_update = window_start.format("%Y-%m-%d %H:%M:%S").to_string();

        let mut query = format!(
            "SELECT torrents.tid, torrents.enabled, domains.suspended, companies.suspended \
             FROM torrents, domains, companies WHERE \
             domains.did = torrents.did AND \
             companies.cid = torrents.cid AND \
             (torrents.modified >= '{last_update}' OR domains.modified >= '{last_update}')"
        );
        // optimization for an empty blacklist: only look for rows that are
        // disabled or suspended
        if self.blacklist.is_empty() {
            query.push_str(
                " AND (torrents.enabled = false OR domains.suspended = true OR companies.suspended = true)",
            );
        }

        let rows: Vec<(InfoHash, bool)> = match conn.query_map(
            &query,
            |(tid, enabled, domain_suspended, company_suspended): (String, bool, bool, bool)| {
                // the suspended columns are inverted relative to enabled
                (tid, enabled && !domain_suspended && !company_suspended)
            },
        ) {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|(tid, allowed)| match InfoHash::from_str(&tid) {
                    Ok(info_hash) => Some((info_hash, allowed)),
                    Err(_) => {
                        warn!("skipping blacklist row with malformed tid: {tid}");
                        None
                    }
                })
                .collect(),
            Err(query_error) => {
                warn!("failed to get blacklist update: {query_error}");
                self.discard_pool();
                return Err(query_error.into());
            }
        };

        *self.last_time.lock().expect("it should lock the window") = query_start;

        info!("updating {} torrents", rows.len());
        let (added, removed) = self.blacklist.apply_rows(&rows);
        info!("   added   {added} torrents to blacklist");
        info!("   removed {removed} torrents from blacklist");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::info_hash::InfoHash;

    use super::Blacklist;

    #[test]
    fn everything_is_allowed_while_the_blacklist_is_empty() {
        let blacklist = Blacklist::default();

        assert!(blacklist.is_allowed(&InfoHash([1; 20])));
        assert!(blacklist.is_empty());
    }

    #[test]
    fn rows_add_and_remove_entries_and_report_the_counts() {
        let blacklist = Blacklist::default();
        let banned = InfoHash([1; 20]);
        let fine = InfoHash([2; 20]);

        let (added, removed) = blacklist.apply_rows(&[(banned, false), (fine, true)]);
        assert_eq!((added, removed), (1, 0));
        assert!(!blacklist.is_allowed(&banned));
        assert!(blacklist.is_allowed(&fine));

        let (added, removed) = blacklist.apply_rows(&[(banned, true)]);
        assert_eq!((added, removed), (0, 1));
        assert!(blacklist.is_allowed(&banned));
    }

    #[test]
    fn reapplying_the_same_row_changes_nothing() {
        let blacklist = Blacklist::default();
        let banned = InfoHash([1; 20]);

        blacklist.apply_rows(&[(banned, false)]);
        let (added, removed) = blacklist.apply_rows(&[(banned, false)]);

        assert_eq!((added, removed), (0, 0));
    }
}
