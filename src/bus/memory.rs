use super::store::{glob_match, BusStore};
use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

enum Stored {
    Value(Bytes),
    List(VecDeque<Bytes>),
}

struct Entry {
    stored: Stored,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process TTL store.
///
/// Used for single-process deployments and tests. Expiry follows the tokio
/// clock, so paused-time tests can advance past a TTL deterministically.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BusStore for MemoryStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BusError> {
        let entry = Entry {
            stored: Stored::Value(value),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BusError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key).map(|entry| entry.is_live(now)) {
            None => return Ok(None),
            Some(false) => {
                entries.remove(key);
                return Ok(None);
            }
            Some(true) => {}
        }

        match entries.get(key).map(|entry| &entry.stored) {
            Some(Stored::Value(value)) => Ok(Some(value.clone())),
            Some(Stored::List(_)) => Err(BusError::Command {
                command: "GET".to_string(),
                details: format!("'{}' holds a list", key),
            }),
            None => Ok(None),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BusError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn push_capped(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), BusError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let live_list = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| matches!(entry.stored, Stored::List(_)));

        match live_list {
            Some(false) => {
                return Err(BusError::Command {
                    command: "LPUSH".to_string(),
                    details: format!("'{}' holds a plain value", key),
                })
            }
            Some(true) => {}
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        stored: Stored::List(VecDeque::new()),
                        expires_at: now + ttl,
                    },
                );
            }
        }

        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        if let Stored::List(list) = &mut entry.stored {
            list.push_front(value);
            list.truncate(capacity);
        }
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn range(&self, key: &str, count: usize) -> Result<Vec<Bytes>, BusError> {
        let now = Instant::now();
        let entries = self.entries.lock();

        match entries.get(key) {
            Some(Entry {
                stored: Stored::List(list),
                expires_at,
            }) if now < *expires_at => Ok(list.iter().take(count).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }
}
