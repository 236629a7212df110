//! In-process TTL store.
//!
//! Backs tests and single-node development setups. Expired entries are
//! dropped when their key is touched, and all of them are purged on every
//! write.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::session_store::{SessionToken, SetMode, Store, StoreError};

#[derive(Debug)]
struct Entry {
    value: String,
    deadline: Instant,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<SessionToken, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<SessionToken, Entry>,
        token: &SessionToken,
    ) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(token).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(token);
        }
        entries.get_mut(token)
    }

    /// Drops every expired entry, so abandoned sessions do not pile up.
    fn purge_expired(entries: &mut HashMap<SessionToken, Entry>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(count = purged, "Purged expired sessions");
        }
    }

    #[cfg(test)]
    fn stored_entries(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, token).map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        token: &SessionToken,
        value: String,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries);
        let exists = entries.contains_key(token);
        let write = match mode {
            SetMode::Always => true,
            SetMode::IfAbsent => !exists,
            SetMode::IfPresent => exists,
        };
        if write {
            entries.insert(token.clone(), Entry::new(value, ttl));
        }
        Ok(write)
    }

    async fn refresh_expiry(
        &self,
        token: &SessionToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, token) {
            Some(entry) => {
                entry.deadline = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let existed = Self::live_entry(&mut entries, token).is_some();
        entries.remove(token);
        Ok(existed)
    }
}
