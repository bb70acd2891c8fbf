//! Pool fingerprints and the per-context result cache keyed by them.

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use craftscan_common::ContextKey;
use parking_lot::RwLock;

use crate::pool::ResourcePool;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Incremental FNV-1a 64-bit hasher.
#[derive(Debug, Clone, Copy)]
struct Fnv1a(u64);

impl Fnv1a {
    const fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    const fn finish(self) -> u64 {
        self.0
    }
}

/// Deterministic 64-bit fingerprint of a pool.
///
/// Hashes the `(code, class, count)` triples in code order, so pools holding
/// the same multiset hash identically however they were filled.
#[must_use]
pub fn fingerprint(pool: &ResourcePool) -> u64 {
    let mut h = Fnv1a::new();
    for (code, entry) in pool.iter() {
        h.write(code.as_bytes());
        h.write(b"|");
        h.write(&entry.class.as_i32().to_le_bytes());
        h.write(b"|");
        h.write(&entry.count.to_le_bytes());
        h.write(b";");
    }
    h.finish()
}

/// Result set produced by one scan.
pub type ResultSet = Arc<BTreeSet<String>>;

/// Why a context has to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    /// Nothing cached for the context yet
    Missing,
    /// Cached result is empty
    Empty,
    /// Pool contents changed
    Changed,
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Missing => "no cached result",
            Self::Empty => "cached result empty",
            Self::Changed => "pool changed",
        })
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Reuse the cached result
    Reuse(ResultSet),
    /// Recompute the result
    Rebuild(RebuildReason),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: u64,
    result: ResultSet,
}

/// Per-context cache of the last fingerprint and result.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<AHashMap<ContextKey, CacheEntry>>,
}

impl FingerprintCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether the context's cached result can serve `fingerprint`.
    #[must_use]
    pub fn lookup(&self, context: &ContextKey, fingerprint: u64) -> CacheDecision {
        let entries = self.entries.read();
        match entries.get(context) {
            None => CacheDecision::Rebuild(RebuildReason::Missing),
            Some(entry) if entry.fingerprint != fingerprint => CacheDecision::Rebuild(RebuildReason::Changed),
            Some(entry) if entry.result.is_empty() => CacheDecision::Rebuild(RebuildReason::Empty),
            Some(entry) => CacheDecision::Reuse(Arc::clone(&entry.result)),
        }
    }

    /// Stores a freshly computed result.
    pub fn store(&self, context: ContextKey, fingerprint: u64, result: ResultSet) {
        self.entries.write().insert(context, CacheEntry { fingerprint, result });
    }

    /// Last result of a context, whatever its fingerprint.
    #[must_use]
    pub fn result(&self, context: &ContextKey) -> Option<ResultSet> {
        self.entries.read().get(context).map(|e| Arc::clone(&e.result))
    }

    /// Last fingerprint of a context.
    #[must_use]
    pub fn fingerprint_of(&self, context: &ContextKey) -> Option<u64> {
        self.entries.read().get(context).map(|e| e.fingerprint)
    }

    /// Forgets one context.
    pub fn invalidate(&self, context: &ContextKey) {
        self.entries.write().remove(context);
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Checks if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
