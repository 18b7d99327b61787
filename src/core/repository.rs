//! The process wide swarm table.
//!
//! A read/write locked map of info hashes to mutex guarded swarms. The outer
//! lock is held only long enough to find or insert an entry; all swarm
//! mutation happens under the per-swarm mutex.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use helix_tracker_primitives::info_hash::InfoHash;

use super::swarm::Swarm;

pub type SharedSwarm = Arc<Mutex<Swarm>>;

#[derive(Default)]
pub struct Swarms {
    swarms: RwLock<BTreeMap<InfoHash, SharedSwarm>>,
}

impl Swarms {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<InfoHash, SharedSwarm>> {
        self.swarms.read().expect("unable to get swarm list")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<InfoHash, SharedSwarm>> {
        self.swarms.write().expect("unable to get writable swarm list")
    }

    #[must_use]
    pub fn get(&self, info_hash: &InfoHash) -> Option<SharedSwarm> {
        self.read().get(info_hash).cloned()
    }

    /// Finds the swarm for `info_hash`, creating it lazily on first contact.
    pub fn get_or_create(&self, info_hash: &InfoHash, dna_only: bool) -> SharedSwarm {
        if let Some(swarm) = self.get(info_hash) {
            return swarm;
        }
        let mut db = self.write();
        db.entry(*info_hash)
            .or_insert_with(|| Arc::new(Mutex::new(Swarm::new(*info_hash, dna_only))))
            .clone()
    }

    /// Inserts a swarm restored from a checkpoint. An already present swarm
    /// wins over the checkpoint copy.
    pub fn insert_restored(&self, swarm: Swarm) {
        let mut db = self.write();
        db.entry(swarm.info_hash()).or_insert_with(|| Arc::new(Mutex::new(swarm)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of all swarms for iteration outside the table lock.
    #[must_use]
    pub fn all(&self) -> Vec<SharedSwarm> {
        self.read().values().cloned().collect()
    }

    /// Runs `visit` on every swarm, taking each swarm's mutex in turn.
    pub fn for_each<F: FnMut(&mut Swarm)>(&self, mut visit: F) {
        for swarm in self.all() {
            let mut guard = swarm.lock().expect("it should lock the swarm");
            visit(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use helix_tracker_primitives::info_hash::InfoHash;

    use super::Swarms;

    #[test]
    fn it_should_create_a_swarm_lazily_and_return_the_same_one_afterwards() {
        let swarms = Swarms::default();
        let info_hash = InfoHash([1; 20]);

        assert!(swarms.get(&info_hash).is_none());

        let first = swarms.get_or_create(&info_hash, false);
        let second = swarms.get_or_create(&info_hash, false);

        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert_eq!(swarms.len(), 1);
    }

    #[test]
    fn a_restored_swarm_does_not_replace_a_live_one() {
        use crate::core::swarm::Swarm;

        let swarms = Swarms::default();
        let info_hash = InfoHash([1; 20]);
        let live = swarms.get_or_create(&info_hash, false);

        swarms.insert_restored(Swarm::new(info_hash, false));

        assert!(std::sync::Arc::ptr_eq(&live, &swarms.get(&info_hash).unwrap()));
    }
}
