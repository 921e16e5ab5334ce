//! Cached signing-key resolution for one trust domain.
//!
//! [`KeyCache`] owns the known key set, refreshing it from the injected
//! [`KeySource`] when the set is missing, older than its TTL, or does not
//! contain a requested key id (the rotation path). The key set is only
//! ever replaced wholesale, so readers never observe a partially updated
//! set.
//!
//! # Concurrency
//!
//! At most one refresh is outstanding per cache. Concurrent callers that
//! miss while a refresh is in flight queue on the refresh lock and then
//! share its result via a generation counter check instead of fetching
//! again. The fetch itself runs on a detached task: a caller abandoning
//! its request mid-validation cannot cancel a refresh other waiters are
//! depending on.
//!
//! # Degradation
//!
//! When a refresh fails and a previous key set exists, the stale set is
//! served and the degradation is logged; availability takes priority over
//! freshness. With no previous set the failure surfaces as
//! `KeySourceUnavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::errors::AuthFailure;
use crate::jwks::{KeySource, KeySourceFailure, SigningKey};
use crate::observability::metrics;

/// The cached key set of a trust domain, replaced atomically on refresh.
struct KeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.kid().to_string(), key))
                .collect(),
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

struct CacheInner {
    source: Arc<dyn KeySource>,
    current: RwLock<Option<Arc<KeySet>>>,
    /// Serializes refreshes; holders of this lock are the only callers
    /// allowed to start a fetch.
    refresh_lock: Mutex<()>,
    /// Bumped on every successful swap. Lets a caller that queued behind
    /// an in-flight refresh detect completion and reuse the result.
    generation: AtomicU64,
}

/// TTL-cached view of a trust domain's published signing keys.
pub struct KeyCache {
    inner: Arc<CacheInner>,
    ttl: Duration,
}

impl KeyCache {
    /// Create a cache over the given key source.
    #[must_use]
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                current: RwLock::new(None),
                refresh_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
            ttl,
        }
    }

    /// Resolve the verification key for a key id.
    ///
    /// # Errors
    ///
    /// - [`AuthFailure::KeyNotFound`] - the trust domain does not publish `kid` (after a refresh)
    /// - [`AuthFailure::KeySourceUnavailable`] - refresh failed and no usable set covers `kid`
    /// - [`AuthFailure::Internal`] - the refresh task itself failed
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey, AuthFailure> {
        if let Some(set) = self.snapshot().await {
            if set.is_fresh(self.ttl) {
                if let Some(key) = set.keys.get(kid) {
                    return Ok(key.clone());
                }
                tracing::debug!(
                    target: "gatehouse.keys",
                    kid,
                    "Key id absent from fresh set, refreshing"
                );
            }
        }
        self.resolve_via_refresh(kid).await
    }

    async fn resolve_via_refresh(&self, kid: &str) -> Result<SigningKey, AuthFailure> {
        let generation_before = self.inner.generation.load(Ordering::Acquire);
        let _guard = self.inner.refresh_lock.lock().await;

        // A refresh completed while this caller waited for the lock;
        // share its result instead of fetching again.
        if self.inner.generation.load(Ordering::Acquire) != generation_before {
            if let Some(set) = self.snapshot().await {
                if set.is_fresh(self.ttl) {
                    return match set.keys.get(kid) {
                        Some(key) => Ok(key.clone()),
                        None => Err(AuthFailure::KeyNotFound {
                            kid: kid.to_string(),
                        }),
                    };
                }
            }
        }

        // Detached so an abandoned request cannot cancel the fetch other
        // waiters depend on; the task swaps the shared state itself.
        let outcome = tokio::spawn(refresh(Arc::clone(&self.inner))).await;

        match outcome {
            Ok(Ok(set)) => match set.keys.get(kid) {
                Some(key) => Ok(key.clone()),
                None => {
                    tracing::debug!(
                        target: "gatehouse.keys",
                        kid,
                        "Key id unknown after refresh"
                    );
                    Err(AuthFailure::KeyNotFound {
                        kid: kid.to_string(),
                    })
                }
            },
            Ok(Err(fetch_err)) => self.serve_stale(kid, &fetch_err).await,
            Err(join_err) => Err(AuthFailure::Internal {
                detail: format!("key refresh task failed: {join_err}"),
            }),
        }
    }

    async fn serve_stale(
        &self,
        kid: &str,
        fetch_err: &KeySourceFailure,
    ) -> Result<SigningKey, AuthFailure> {
        if let Some(stale) = self.snapshot().await {
            metrics::record_stale_key_serve();
            tracing::warn!(
                target: "gatehouse.keys",
                error = %fetch_err,
                set_age_secs = stale.fetched_at.elapsed().as_secs(),
                "Key source unavailable, serving previous key set"
            );
            // An unknown kid here stays unavailable rather than not-found:
            // with the source down we cannot tell a rotated-in key from an
            // unknown one, and retry-after-backoff is the right client action.
            return match stale.keys.get(kid) {
                Some(key) => Ok(key.clone()),
                None => Err(AuthFailure::KeySourceUnavailable {
                    detail: fetch_err.to_string(),
                }),
            };
        }

        Err(AuthFailure::KeySourceUnavailable {
            detail: fetch_err.to_string(),
        })
    }

    async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.inner.current.read().await.clone()
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").field("ttl", &self.ttl).finish()
    }
}

/// Fetch the key set and swap it into the shared state.
///
/// Runs to completion regardless of whether the caller that triggered it
/// is still waiting.
async fn refresh(inner: Arc<CacheInner>) -> Result<Arc<KeySet>, KeySourceFailure> {
    match inner.source.fetch_keys().await {
        Ok(keys) => {
            let set = Arc::new(KeySet::new(keys));
            *inner.current.write().await = Some(Arc::clone(&set));
            inner.generation.fetch_add(1, Ordering::Release);
            metrics::record_key_refresh("success");
            tracing::debug!(
                target: "gatehouse.keys",
                key_count = set.keys.len(),
                "Key set refreshed"
            );
            Ok(set)
        }
        Err(err) => {
            metrics::record_key_refresh("error");
            Err(err)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
