//! Content-addressed embedding cache.
//!
//! Keys are SHA-256 hashes of the exact text, values are shared vectors.
//! Misses from one call go to the backend as a single batch. Concurrent
//! callers missing the same key wait on the caller that owns the in-flight
//! computation instead of issuing their own.

use lru::LruCache;
use membound_core::{BackendError, ContentHash, EmbeddingBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// A cached embedding. Cloning shares the underlying buffer.
pub type SharedVector = Arc<[f32]>;

type Outcome = Option<Result<SharedVector, BackendError>>;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Texts served straight from the store
    pub hits: u64,
    /// Texts sent to the backend
    pub misses: u64,
    /// Texts served by waiting on another caller's in-flight batch
    pub coalesced: u64,
    /// Batched backend invocations
    pub backend_calls: u64,
    /// Entries currently stored
    pub entries: usize,
}

struct Inner {
    store: LruCache<ContentHash, SharedVector>,
    inflight: HashMap<ContentHash, watch::Receiver<Outcome>>,
}

/// Shared, thread-safe embedding store.
///
/// Pass it around as `Arc<EmbeddingCache>`; every session holding a clone
/// reads and fills the same entries.
pub struct EmbeddingCache {
    backend: Arc<dyn EmbeddingBackend>,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    backend_calls: AtomicU64,
}

/// Where each requested text is served from.
enum Source {
    Ready(SharedVector),
    Owned(usize),
    Waiting(watch::Receiver<Outcome>),
}

impl EmbeddingCache {
    pub const DEFAULT_CAPACITY: usize = 1_000;

    /// Bounded cache evicting least-recently-used entries past `capacity`.
    /// A capacity of zero means unbounded.
    pub fn new(backend: Arc<dyn EmbeddingBackend>, capacity: usize) -> Self {
        let store = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            backend,
            inner: Mutex::new(Inner {
                store,
                inflight: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            backend_calls: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::new(backend, Self::DEFAULT_CAPACITY)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return one vector per text, in input order.
    ///
    /// Backend errors fail the whole call and leave nothing cached for the
    /// failed batch.
    pub async fn get_or_compute(&self, texts: &[String]) -> Result<Vec<SharedVector>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut sources = Vec::with_capacity(texts.len());
        let mut batch: Vec<(ContentHash, String)> = Vec::new();
        let mut senders: Vec<watch::Sender<Outcome>> = Vec::new();

        {
            let mut inner = self.lock();
            let mut owned_index: HashMap<ContentHash, usize> = HashMap::new();

            for text in texts {
                let key = ContentHash::of(text);
                if let Some(vector) = inner.store.get(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    sources.push(Source::Ready(vector.clone()));
                } else if let Some(&idx) = owned_index.get(&key) {
                    // Duplicate within this call
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    sources.push(Source::Owned(idx));
                } else if let Some(rx) = inner.inflight.get(&key) {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    sources.push(Source::Waiting(rx.clone()));
                } else {
                    let (tx, rx) = watch::channel(None);
                    inner.inflight.insert(key, rx);
                    owned_index.insert(key, batch.len());
                    sources.push(Source::Owned(batch.len()));
                    batch.push((key, text.clone()));
                    senders.push(tx);
                }
            }
        }

        let computed = if batch.is_empty() {
            Vec::new()
        } else {
            let guard = InflightGuard {
                cache: self,
                keys: batch.iter().map(|(key, _)| *key).collect(),
                armed: true,
            };
            self.compute_batch(batch, senders, guard).await?
        };

        let mut out = Vec::with_capacity(texts.len());
        for source in sources {
            let vector = match source {
                Source::Ready(vector) => vector,
                Source::Owned(idx) => computed[idx].clone(),
                Source::Waiting(rx) => wait_for(rx).await?,
            };
            out.push(vector);
        }
        Ok(out)
    }

    async fn compute_batch(
        &self,
        batch: Vec<(ContentHash, String)>,
        senders: Vec<watch::Sender<Outcome>>,
        mut guard: InflightGuard<'_>,
    ) -> Result<Vec<SharedVector>, BackendError> {
        let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        self.misses.fetch_add(inputs.len() as u64, Ordering::Relaxed);
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
        debug!(backend = self.backend.name(), batch = inputs.len(), "embedding cache miss batch");

        let result = self.backend.embed(&inputs).await.and_then(|vectors| {
            if vectors.len() != inputs.len() {
                return Err(BackendError::EmbeddingShape {
                    expected: inputs.len(),
                    got: vectors.len(),
                });
            }
            Ok(vectors.into_iter().map(SharedVector::from).collect::<Vec<_>>())
        });

        {
            let mut inner = self.lock();
            for (key, _) in &batch {
                inner.inflight.remove(key);
            }
            if let Ok(vectors) = &result {
                for ((key, _), vector) in batch.iter().zip(vectors) {
                    inner.store.put(*key, vector.clone());
                }
            }
        }
        guard.armed = false;

        match &result {
            Ok(vectors) => {
                for (tx, vector) in senders.iter().zip(vectors) {
                    let _ = tx.send(Some(Ok(vector.clone())));
                }
            }
            Err(e) => {
                for tx in &senders {
                    let _ = tx.send(Some(Err(e.clone())));
                }
            }
        }

        result
    }

    /// Cached vector for `text` without touching the backend or recency order.
    pub fn peek(&self, text: &str) -> Option<SharedVector> {
        self.lock().store.peek(&ContentHash::of(text)).cloned()
    }

    pub fn contains(&self, key: &ContentHash) -> bool {
        self.lock().store.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().store.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("backend", &self.backend.name())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn wait_for(mut rx: watch::Receiver<Outcome>) -> Result<SharedVector, BackendError> {
    let outcome = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| BackendError::Abandoned("embedding owner dropped before completing".into()))?;
    match &*outcome {
        Some(result) => result.clone(),
        None => Err(BackendError::Abandoned("embedding outcome missing".into())),
    }
}

/// Clears in-flight markers if the owning future is dropped mid-computation,
/// so later callers retry instead of waiting forever.
struct InflightGuard<'a> {
    cache: &'a EmbeddingCache,
    keys: Vec<ContentHash>,
    armed: bool,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.cache.lock();
            for key in &self.keys {
                inner.inflight.remove(key);
            }
        }
    }
}
