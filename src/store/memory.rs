//! In-memory `SharedStore` fake, used by unit and integration tests in
//! place of a real Redis instance.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::Result;
use crate::traits::{SharedStore, StoreMessage};

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    channels: HashMap<String, VecDeque<StoreMessage>>,
}

/// A process-local, lock-guarded stand-in for the Redis-backed store.
/// Sufficient for deterministic tests of the Dispatcher, ClusterRegistry,
/// and worker loops without a network dependency.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        Ok(self.state.lock().strings.remove(key).map_or(0, |_| 1))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .hashes
            .get_mut(key)
            .and_then(|h| h.remove(field))
            .map_or(0, |_| 1))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut state = self.state.lock();
        let hash = state.hashes.entry(key.to_string()).or_default();
        let current = hash
            .get(field)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let hash = state.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            Ok(false)
        } else {
            hash.insert(field.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn hcas_delete(&self, key: &str, field: &str, expected: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(hash) = state.hashes.get_mut(key) else {
            return Ok(false);
        };
        if hash.get(field).map(String::as_str) == Some(expected) {
            hash.remove(field);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn list_pop_blocking(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(value) = self
                .state
                .lock()
                .lists
                .get_mut(key)
                .and_then(|l| l.pop_front())
            {
                return Ok(Some(value));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .lists
            .get(key)
            .map_or(0, |l| l.len() as u64))
    }

    async fn list_remove_by_value(&self, key: &str, value: &str) -> Result<u64> {
        let mut state = self.state.lock();
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };
        if let Some(pos) = list.iter().position(|v| v == value) {
            list.remove(pos);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn list_items(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        self.state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push_back(StoreMessage {
                channel: channel.to_string(),
                payload: message.to_string(),
            });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe_once(&self, channel: &str, timeout: Duration) -> Result<Option<StoreMessage>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(msg) = self
                .state
                .lock()
                .channels
                .get_mut(channel)
                .and_then(|q| q.pop_front())
            {
                return Ok(Some(msg));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let current = state.strings.get(key).map(String::as_str);
        if current == expected {
            state.strings.insert(key.to_string(), new.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.strings.get(key).map(String::as_str) == Some(expected) {
            state.strings.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> Result<()> {
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .strings
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hsetnx_is_exclusive() {
        let store = InMemoryStore::new();
        assert!(store.hsetnx("h", "f", "a").await.unwrap());
        assert!(!store.hsetnx("h", "f", "b").await.unwrap());
        assert_eq!(store.hget("h", "f").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn list_pop_blocking_times_out() {
        let store = InMemoryStore::new();
        let popped = store.list_pop_blocking("q", Duration::from_millis(20)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn list_pop_blocking_wakes_on_push() {
        let store = InMemoryStore::new();
        let store2 = store.clone();
        let handle = tokio::spawn(async move {
            store2.list_pop_blocking("q", Duration::from_secs(2)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.list_push("q", "job-1").await.unwrap();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.as_deref(), Some("job-1"));
    }
}
