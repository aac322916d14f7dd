//! Process-local TTL caches in front of read-heavy endpoints.
//!
//! Two instances exist: a general list-query cache keyed by normalized
//! filter parameters, and a single-slot cache for today's curation keyed by
//! the current UTC date. Both are constructed once at startup and shared by
//! handle; neither survives a restart. Expired entries count as misses and
//! are dropped lazily or by the batch eviction pass.
use crate::error::AppError;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: Value,
    inserted_at: Instant,
}

/// Time-bounded memoization for idempotent, parameter-driven list queries.
/// Free-text search queries must not be cached (high cardinality, low
/// reuse); that policy is enforced by callers, which skip the cache when a
/// search term is present.
pub struct QueryCache {
    ttl: Duration,
    capacity: usize,
    evict_to: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl QueryCache {
    /// Once more than `capacity` entries are held, the oldest are evicted in
    /// one batch down to half the capacity.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            evict_to: (capacity / 2).max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic, order-independent key for a filter set: parameters are
    /// sorted by name before serialization so logically identical queries
    /// share a key.
    pub fn compute_key(params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort();
        sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn set(&self, key: &str, value: Value) {
        self.set_at(key, value, Instant::now());
    }

    /// Cached-read surface for list endpoints: returns the payload and
    /// whether it came from the cache.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> Result<(Value, bool), AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok((hit, true));
        }
        let value = loader().await?;
        self.set(key, value.clone());
        Ok((value, false))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        let entry = entries.get(key)?;
        if now.duration_since(entry.inserted_at) < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn set_at(&self, key: &str, value: Value, now: Instant) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
            },
        );

        if entries.len() > self.capacity {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
            let excess = entries.len() - self.evict_to;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }
    }
}

struct TodaySlot {
    date: NaiveDate,
    value: Value,
    inserted_at: Instant,
}

/// Single-slot cache for the daily curation payload. A hit requires both a
/// matching UTC date and a fresh timestamp, so the slot rolls over naturally
/// at midnight.
pub struct TodayCache {
    ttl: Duration,
    slot: Mutex<Option<TodaySlot>>,
}

impl TodayCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<Value> {
        self.get_at(date, Instant::now())
    }

    pub fn set(&self, date: NaiveDate, value: Value) {
        self.set_at(date, value, Instant::now());
    }

    fn get_at(&self, date: NaiveDate, now: Instant) -> Option<Value> {
        let slot = self.slot.lock().expect("cache lock poisoned");
        let cached = slot.as_ref()?;
        if cached.date == date && now.duration_since(cached.inserted_at) < self.ttl {
            Some(cached.value.clone())
        } else {
            None
        }
    }

    fn set_at(&self, date: NaiveDate, value: Value, now: Instant) {
        let mut slot = self.slot.lock().expect("cache lock poisoned");
        *slot = Some(TodaySlot {
            date,
            value,
            inserted_at: now,
        });
    }
}
