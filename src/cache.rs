//! Content-addressed outcome memoization
//!
//! Uses moka async cache (Send + Sync, TTL-based eviction). The fingerprint
//! is a SHA-256 digest over (code, compiler variant, raw option string), so
//! identical requests always collide and requests differing in any of the
//! three never do. Failing outcomes are as cacheable as successful ones;
//! both are deterministic for the same fingerprint. There is no coalescing
//! of concurrent identical requests: each may run, last write wins.

use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::sandbox::{ExecutionOutcome, ExecutionRequest};

const MAX_ENTRIES: u64 = 10_000;

/// Fingerprint of one request, the cache key
pub fn fingerprint(request: &ExecutionRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.code.as_bytes());
    hasher.update(b"\n");
    hasher.update(request.compiler.id().as_bytes());
    hasher.update(b"\n");
    hasher.update(request.options.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// TTL-evicting outcome cache; a disabled cache stores and returns nothing
#[derive(Clone)]
pub struct OutcomeCache {
    inner: Option<Cache<String, ExecutionOutcome>>,
}

impl OutcomeCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        let inner = enabled.then(|| {
            Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build()
        });
        OutcomeCache { inner }
    }

    pub fn disabled() -> Self {
        OutcomeCache { inner: None }
    }

    /// Stored outcome for a fingerprint, if present and unexpired
    pub async fn get(&self, key: &str) -> Option<ExecutionOutcome> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    /// Store an outcome, overwriting any entry for the same fingerprint
    pub async fn insert(&self, key: String, outcome: ExecutionOutcome) {
        if let Some(cache) = &self.inner {
            cache.insert(key, outcome).await;
        }
    }
}
