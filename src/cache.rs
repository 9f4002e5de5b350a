//! Bounded, time-aware store for enhanced analysis results.
//!
//! Key properties:
//! - Entries expire lazily: a lookup older than the TTL deletes the entry
//! - Capacity is hard: inserting into a full store evicts the oldest entry first
//! - Eviction order is `(created_at, key)`, so ties resolve by key
//!
//! The store itself is single-owner (`&mut self`). Callers that share it
//! across tasks wrap it in one lock and run each operation inside a single
//! acquisition, which keeps the expire/evict/insert sequences atomic.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::pipeline::enhancement::ReportBundle;

// ═══════════════════════════════════════════════════════════
// CacheKey
// ═══════════════════════════════════════════════════════════

/// Identity of one analysis request: `<source>:<branch>:<bound>[:<extra>...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Join source identity, ref and bounding parameter with `:`.
    ///
    /// `%` and `:` in `branch` are percent-escaped, so a branch can never
    /// shift where the source identity ends.
    pub fn new(source: &str, branch: &str, max_items: usize) -> Self {
        let branch = branch.replace('%', "%25").replace(':', "%3A");
        Self(format!("{source}:{branch}:{max_items}"))
    }

    /// Append one more discriminating segment.
    pub fn with_segment(mut self, segment: &str) -> Self {
        self.0.push(':');
        self.0.push_str(segment);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key was derived from `source`.
    pub fn belongs_to(&self, source: &str) -> bool {
        self.0
            .strip_prefix(source)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════
// CacheEntry
// ═══════════════════════════════════════════════════════════

/// A stored bundle and the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: ReportBundle,
    created_at: Instant,
}

impl CacheEntry {
    pub fn value(&self) -> &ReportBundle {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

// ═══════════════════════════════════════════════════════════
// CacheStore
// ═══════════════════════════════════════════════════════════

pub struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl CacheStore {
    /// Create an empty store. A zero capacity is raised to one.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Live entry for `key`, deleting it first if it has expired.
    pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
        self.get_at(key, Instant::now())
    }

    /// Store `value` under `key`, stamped with the current instant.
    pub fn set(&mut self, key: CacheKey, value: ReportBundle) {
        self.set_at(key, value, Instant::now());
    }

    /// Remove `key` if present. Returns whether an entry was removed.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub fn clear_matching<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&CacheKey) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Remove every entry derived from `source` (keys prefixed `source:`).
    pub fn clear_source(&mut self, source: &str) -> usize {
        self.clear_matching(|key| key.belongs_to(source))
    }

    /// Remove everything. Returns how many entries were dropped.
    pub fn clear_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Eagerly drop every expired entry.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Whether `key` holds a live entry. Does not delete expired entries.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now(), self.ttl))
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Clock-explicit variants ──────────────────────────

    fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<&CacheEntry> {
        let expired = self.entries.get(key)?.is_expired(now, self.ttl);
        if expired {
            tracing::debug!(key = %key, "Cache entry expired");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    fn purge_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        before - self.entries.len()
    }

    fn set_at(&mut self, key: CacheKey, value: ReportBundle, now: Instant) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            tracing::debug!(key = %key, "Cache full, evicting oldest entry");
            self.entries.remove(&key);
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
