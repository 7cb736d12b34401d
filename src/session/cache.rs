use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::host_shard::HostShard;
use super::renter_session::RenterSession;
use super::renter_shard::RenterShard;
use crate::db::keys;

/// Live objects keyed by `<owner>/<id>`.
#[derive(Debug)]
pub struct LiveMap<T> {
    entries: DashMap<String, Arc<T>>,
}

impl<T> LiveMap<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the cached object or builds one. `build` runs under the
    /// entry's lock, so only one caller ever builds a key and its side
    /// effects happen once. `build` must not touch this map.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: String,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(found) = self.get(&key) {
            return Ok(found);
        }
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let built = Arc::new(build()?);
                entry.insert(Arc::clone(&built));
                Ok(built)
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for LiveMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// At most one live session/shard object per identity within a process.
/// Created once at start-up and shared by reference.
#[derive(Debug, Default)]
pub struct ObjectCache {
    pub sessions: LiveMap<RenterSession>,
    pub renter_shards: LiveMap<RenterShard>,
    pub host_shards: LiveMap<HostShard>,
}

impl ObjectCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn key(owner: &str, id: &str) -> String {
        format!("{}/{}", owner, id)
    }

    /// Forgets a finished session and its shards. Handles already given out
    /// keep working; the next lookup rehydrates from the store.
    pub fn evict_session(&self, session: &RenterSession) {
        let owner = session.owner();
        self.sessions.remove(&Self::key(owner, session.id()));
        for (index, hash) in session.shard_hashes().iter().enumerate() {
            let shard_id = keys::shard_id(session.id(), hash, index);
            self.renter_shards.remove(&Self::key(owner, &shard_id));
        }
    }

    pub fn evict_host_shard(&self, owner: &str, contract_id: &str) {
        self.host_shards.remove(&Self::key(owner, contract_id));
    }
}
