//! Query client: the executor that ties the store, the in-flight fetch
//! bookkeeping, and the observer registry together.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new();
//! let api = api.clone();
//! let models = client
//!   .query(keys::model_lists(), move || {
//!     let api = api.clone();
//!     async move { api.list_models().await.map_err(|e| e.to_string()) }
//!   })
//!   .await?;
//! ```
//!
//! Fetchers return `Result<T, String>`; the client erases results to JSON
//! for storage and decodes them on the way out, so heterogeneous result
//! types share one cache.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::QueryError;
use crate::key::QueryKey;
use crate::snapshot::QuerySnapshot;
use crate::store::{
  CacheStore, EntryPatch, FetchDecision, FetchOutcome, StoredFetcher, DEFAULT_STALE_TIME,
};
use crate::subscription::{Subscription, SubscriptionRegistry};

/// Idle window after which unwatched entries are evicted by default.
const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Per-query options. Anything unset falls back to the client defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
  stale_time: Option<Duration>,
}

impl QueryOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// How long a fetched result is served without refetching.
  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }
}

struct ClientInner {
  store: CacheStore,
  subs: SubscriptionRegistry,
}

/// Handle to a query cache.
///
/// Cheap to clone; clones share the same store and observer registry.
/// Construct one per independent cache (tests typically build their own).
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<ClientInner>,
  default_stale_time: Duration,
  gc_time: Option<Duration>,
}

impl QueryClient {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(ClientInner {
        store: CacheStore::new(),
        subs: SubscriptionRegistry::new(),
      }),
      default_stale_time: DEFAULT_STALE_TIME,
      gc_time: Some(DEFAULT_GC_TIME),
    }
  }

  /// Set the stale window used by queries without an explicit one.
  pub fn with_default_stale_time(mut self, stale_time: Duration) -> Self {
    self.default_stale_time = stale_time;
    self
  }

  /// Set the idle window after which unwatched entries are evicted.
  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = Some(gc_time);
    self
  }

  /// Keep entries forever (the embedding application manages memory).
  pub fn without_eviction(mut self) -> Self {
    self.gc_time = None;
    self
  }

  /// The underlying store, for direct reads and seeding.
  pub fn store(&self) -> &CacheStore {
    &self.inner.store
  }

  /// Snapshot of the entry under `key`, if present.
  pub fn get(&self, key: &QueryKey) -> Option<QuerySnapshot> {
    self.inner.store.get(key)
  }

  /// Seed or replace the data under `key` and notify observers. The entry
  /// counts as freshly fetched.
  pub fn set_data<T: Serialize>(&self, key: &QueryKey, value: T) -> Result<(), QueryError> {
    let json = serde_json::to_value(value).map_err(|e| QueryError::Decode(e.to_string()))?;
    self.inner.store.set(key, EntryPatch::data(json));
    if let Some(snapshot) = self.inner.store.get(key) {
      self.inner.subs.notify(&snapshot);
    }
    Ok(())
  }

  /// Register an observer for entries under `key` (exact or prefix).
  pub fn subscribe(
    &self,
    key: QueryKey,
    callback: impl Fn(&QuerySnapshot) + Send + Sync + 'static,
  ) -> Subscription {
    self.inner.subs.subscribe(key, callback)
  }

  /// Fetch the data under `key`, using the client default stale window.
  pub async fn query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T, QueryError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    self.query_with(key, fetcher, QueryOptions::default()).await
  }

  /// Fetch the data under `key`.
  ///
  /// A fresh cache entry resolves immediately without invoking `fetcher`.
  /// If a fetch for the key is already in flight the caller joins it and
  /// receives the same outcome (`fetcher` is not invoked). Otherwise the
  /// fetch runs on a spawned task so it survives caller cancellation, and
  /// its completion updates the store unless a newer fetch has superseded
  /// it in the meantime.
  pub async fn query_with<T, F, Fut>(
    &self,
    key: QueryKey,
    fetcher: F,
    options: QueryOptions,
  ) -> Result<T, QueryError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    self.sweep();

    let stale_time = options.stale_time.unwrap_or(self.default_stale_time);
    let stored = erase(fetcher);

    match self
      .inner
      .store
      .begin_fetch(&key, stale_time, Arc::clone(&stored))
    {
      FetchDecision::Fresh(value) => {
        trace!(key = %key, "cache hit");
        decode(&value)
      }
      FetchDecision::Join(mut rx) => {
        trace!(key = %key, "joining in-flight fetch");
        await_outcome(&mut rx).await.and_then(|v| decode(&v))
      }
      FetchDecision::Start(start) => {
        debug!(key = %key, "fetching");
        self.inner.subs.notify(&start.snapshot);
        self.spawn_fetch(key, start.generation, stored, start.tx);
        let mut rx = start.rx;
        await_outcome(&mut rx).await.and_then(|v| decode(&v))
      }
    }
  }

  /// Mark the entries under `keys` stale and refetch every watched one in
  /// the background using its stored fetcher.
  ///
  /// Refetches are scheduled, not awaited.
  pub fn invalidate(&self, keys: &[QueryKey]) {
    let affected = self.inner.store.invalidate(keys);
    for key in affected {
      if !self.inner.subs.is_watched(&key) {
        continue;
      }
      if let Some(start) = self.inner.store.begin_refetch(&key) {
        self.inner.subs.notify(&start.snapshot);
        self.spawn_fetch(key, start.generation, start.fetcher, start.tx);
      } else if let Some(snapshot) = self.inner.store.get(&key) {
        // Seeded entry with no fetcher: observers still learn it went
        // stale.
        self.inner.subs.notify(&snapshot);
      }
    }
  }

  /// Drop every cache entry. Observer registrations survive.
  pub fn clear(&self) {
    self.inner.store.clear();
  }

  /// Evict unwatched entries idle past the configured GC window. Returns
  /// the number evicted. A no-op when eviction is disabled.
  pub fn evict_idle(&self) -> usize {
    match self.gc_time {
      Some(window) => {
        let subs = self.inner.subs.clone();
        self
          .inner
          .store
          .evict_idle(window, move |key| subs.is_watched(key))
      }
      None => 0,
    }
  }

  /// Opportunistic GC on query admission.
  fn sweep(&self) {
    self.evict_idle();
  }

  /// Drive a registered fetch on its own task and apply the completion.
  fn spawn_fetch(
    &self,
    key: QueryKey,
    generation: u64,
    fetcher: StoredFetcher,
    tx: broadcast::Sender<FetchOutcome>,
  ) {
    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      let outcome = (fetcher)().await;
      let settled = inner.store.settle_fetch(&key, generation, &outcome);
      // Ignore send errors - every joined caller may have been dropped.
      let _ = tx.send(outcome);
      if let Some(snapshot) = settled {
        inner.subs.notify(&snapshot);
      }
    });
  }
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}

/// Wrap a typed fetcher into the stored, type-erased form.
fn erase<T, F, Fut>(fetcher: F) -> StoredFetcher
where
  T: Serialize + Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, String>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    let erased: BoxFuture<'static, FetchOutcome> = Box::pin(async move {
      match fut.await {
        Ok(value) => serde_json::to_value(value)
          .map(Arc::new)
          .map_err(|e| QueryError::Decode(e.to_string())),
        Err(message) => Err(QueryError::Fetch(message)),
      }
    });
    erased
  })
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, QueryError> {
  serde_json::from_value(value.clone()).map_err(|e| QueryError::Decode(e.to_string()))
}

async fn await_outcome(rx: &mut broadcast::Receiver<FetchOutcome>) -> FetchOutcome {
  match rx.recv().await {
    Ok(outcome) => outcome,
    // Sender dropped without sending - treat as cancellation.
    Err(_) => Err(QueryError::Cancelled),
  }
}
