//! In-memory cache store: the single shared mutable structure.
//!
//! Entries are keyed by the query key's identity hash and hold the last
//! fetched data, the last error, staleness bookkeeping, and the in-flight
//! slot the executor de-duplicates through. All state lives behind one
//! mutex that is never held across an await; the store performs no I/O.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::QueryError;
use crate::key::QueryKey;
use crate::snapshot::QuerySnapshot;

/// Stale window applied when an entry is created without an explicit one.
pub(crate) const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60);

/// Outcome of a fetch attempt, fanned out to every joined caller.
pub(crate) type FetchOutcome = Result<Arc<Value>, QueryError>;

/// Type-erased fetcher retained per key so invalidation can refetch
/// without the original caller re-invoking `query`.
pub(crate) type StoredFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchOutcome> + Send + Sync>;

/// A single cached query result plus its fetch bookkeeping.
struct CacheEntry {
  key: QueryKey,
  data: Option<Arc<Value>>,
  error: Option<QueryError>,
  fetched_at: Option<DateTime<Utc>>,
  /// Monotonic companion to `fetched_at`, used for staleness math.
  fetched_instant: Option<Instant>,
  stale_time: Duration,
  /// Set by invalidation; cleared by the next successful fetch.
  invalidated: bool,
  /// Bumped whenever a new fetch starts. A completion whose generation is
  /// no longer current must not overwrite the entry.
  generation: u64,
  /// Broadcast side of the current in-flight fetch, if one is running.
  inflight: Option<broadcast::Sender<FetchOutcome>>,
  fetcher: Option<StoredFetcher>,
  last_touched: Instant,
}

impl CacheEntry {
  fn new(key: QueryKey, stale_time: Duration) -> Self {
    Self {
      key,
      data: None,
      error: None,
      fetched_at: None,
      fetched_instant: None,
      stale_time,
      invalidated: false,
      generation: 0,
      inflight: None,
      fetcher: None,
      last_touched: Instant::now(),
    }
  }

  fn is_fresh(&self) -> bool {
    if self.invalidated || self.data.is_none() {
      return false;
    }
    self
      .fetched_instant
      .map(|t| t.elapsed() <= self.stale_time)
      .unwrap_or(false)
  }

  fn is_stale(&self) -> bool {
    !self.is_fresh()
  }

  fn snapshot(&self) -> QuerySnapshot {
    QuerySnapshot {
      key: self.key.clone(),
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      is_fetching: self.inflight.is_some(),
      is_stale: self.is_stale(),
    }
  }
}

/// Partial entry update accepted by [`CacheStore::set`].
///
/// Fields left as `None` keep their current value. A patch carrying data
/// stamps `fetched_at` with the current time.
#[derive(Default)]
pub struct EntryPatch {
  pub data: Option<Value>,
  pub error: Option<QueryError>,
  pub stale_time: Option<Duration>,
}

impl EntryPatch {
  /// Patch that replaces the entry's data.
  pub fn data(value: Value) -> Self {
    Self {
      data: Some(value),
      ..Self::default()
    }
  }

  /// Patch that records a failure.
  pub fn error(error: QueryError) -> Self {
    Self {
      error: Some(error),
      ..Self::default()
    }
  }

  /// Override the entry's stale window.
  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }
}

/// How the executor should proceed with a query for a key.
pub(crate) enum FetchDecision {
  /// Entry is fresh; resolve immediately with the cached data.
  Fresh(Arc<Value>),
  /// A fetch is already in flight; await its outcome.
  Join(broadcast::Receiver<FetchOutcome>),
  /// No usable entry; a new fetch was registered and must be driven.
  Start(FetchStart),
}

/// A newly registered fetch, ready to be spawned.
pub(crate) struct FetchStart {
  pub generation: u64,
  pub tx: broadcast::Sender<FetchOutcome>,
  pub rx: broadcast::Receiver<FetchOutcome>,
  pub snapshot: QuerySnapshot,
}

/// A refetch started from the stored fetcher (invalidation path).
pub(crate) struct RefetchStart {
  pub generation: u64,
  pub tx: broadcast::Sender<FetchOutcome>,
  pub fetcher: StoredFetcher,
  pub snapshot: QuerySnapshot,
}

/// Keyed storage of query results.
///
/// Constructed explicitly and passed by handle; there is no global
/// instance. Clones share the same entry map.
#[derive(Clone)]
pub struct CacheStore {
  entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl CacheStore {
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Entries are plain data, so a panicked writer cannot leave an entry
  /// logically torn; recover the guard instead of surfacing poisoning on
  /// every read path.
  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Snapshot of the entry under `key`, if present.
  pub fn get(&self, key: &QueryKey) -> Option<QuerySnapshot> {
    let entries = self.lock();
    entries.get(key.cache_hash()).map(CacheEntry::snapshot)
  }

  /// Merge a patch into the entry under `key`, creating it if absent.
  ///
  /// Data updates stamp `fetched_at = now()` and clear the invalidated
  /// flag, so a manual seed counts as a fresh fetch.
  pub fn set(&self, key: &QueryKey, patch: EntryPatch) {
    let mut entries = self.lock();
    let entry = entries
      .entry(key.cache_hash().to_string())
      .or_insert_with(|| CacheEntry::new(key.clone(), DEFAULT_STALE_TIME));

    if let Some(stale_time) = patch.stale_time {
      entry.stale_time = stale_time;
    }
    if let Some(data) = patch.data {
      entry.data = Some(Arc::new(data));
      entry.error = None;
      entry.invalidated = false;
      entry.fetched_at = Some(Utc::now());
      entry.fetched_instant = Some(Instant::now());
    }
    if let Some(error) = patch.error {
      entry.error = Some(error);
    }
    entry.last_touched = Instant::now();
  }

  /// Mark every entry addressed by one of `keys` (exact or prefix match)
  /// as stale. Data is preserved: consumers keep rendering it while the
  /// refetch runs. Returns the keys of the affected entries.
  pub fn invalidate(&self, keys: &[QueryKey]) -> Vec<QueryKey> {
    let mut entries = self.lock();
    let mut affected = Vec::new();
    for entry in entries.values_mut() {
      if keys.iter().any(|k| k.matches(&entry.key)) {
        entry.invalidated = true;
        entry.last_touched = Instant::now();
        affected.push(entry.key.clone());
      }
    }
    if !affected.is_empty() {
      debug!(count = affected.len(), "invalidated cache entries");
    }
    affected
  }

  /// Drop the entry under `key`. Returns whether it existed.
  pub fn remove(&self, key: &QueryKey) -> bool {
    self.lock().remove(key.cache_hash()).is_some()
  }

  /// Drop all entries.
  pub fn clear(&self) {
    self.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Evict entries idle for longer than `max_idle`.
  ///
  /// Entries with a fetch in flight are never evicted, and `exempt`
  /// (typically "has a live observer") spares everything it returns true
  /// for. The exemption check runs outside the map lock; eligibility is
  /// re-checked before each removal.
  pub fn evict_idle(&self, max_idle: Duration, exempt: impl Fn(&QueryKey) -> bool) -> usize {
    let candidates: Vec<QueryKey> = {
      let entries = self.lock();
      entries
        .values()
        .filter(|e| e.inflight.is_none() && e.last_touched.elapsed() > max_idle)
        .map(|e| e.key.clone())
        .collect()
    };

    let mut evicted = 0;
    for key in candidates {
      if exempt(&key) {
        continue;
      }
      let mut entries = self.lock();
      let still_idle = entries
        .get(key.cache_hash())
        .map(|e| e.inflight.is_none() && e.last_touched.elapsed() > max_idle)
        .unwrap_or(false);
      if still_idle {
        entries.remove(key.cache_hash());
        evicted += 1;
      }
    }
    if evicted > 0 {
      debug!(count = evicted, "evicted idle cache entries");
    }
    evicted
  }

  /// Admission decision for a query: fresh hit, join of the current
  /// in-flight fetch, or registration of a new fetch. One lock
  /// acquisition covers the whole decision, which is what makes the
  /// de-duplication invariant hold.
  pub(crate) fn begin_fetch(
    &self,
    key: &QueryKey,
    stale_time: Duration,
    fetcher: StoredFetcher,
  ) -> FetchDecision {
    let mut entries = self.lock();
    let entry = entries
      .entry(key.cache_hash().to_string())
      .or_insert_with(|| CacheEntry::new(key.clone(), stale_time));

    entry.last_touched = Instant::now();
    entry.stale_time = stale_time;
    entry.fetcher = Some(fetcher);

    if entry.is_fresh() {
      if let Some(data) = entry.data.clone() {
        return FetchDecision::Fresh(data);
      }
    }

    if let Some(tx) = &entry.inflight {
      return FetchDecision::Join(tx.subscribe());
    }

    entry.generation += 1;
    let (tx, rx) = broadcast::channel(1);
    entry.inflight = Some(tx.clone());
    FetchDecision::Start(FetchStart {
      generation: entry.generation,
      tx,
      rx,
      snapshot: entry.snapshot(),
    })
  }

  /// Start a refetch from the stored fetcher, superseding any fetch
  /// already in flight (its completion will be discarded by the
  /// generation check in [`settle_fetch`]).
  pub(crate) fn begin_refetch(&self, key: &QueryKey) -> Option<RefetchStart> {
    let mut entries = self.lock();
    let entry = entries.get_mut(key.cache_hash())?;
    let fetcher = entry.fetcher.clone()?;

    entry.generation += 1;
    entry.last_touched = Instant::now();
    let (tx, _rx) = broadcast::channel(1);
    entry.inflight = Some(tx.clone());
    Some(RefetchStart {
      generation: entry.generation,
      tx,
      fetcher,
      snapshot: entry.snapshot(),
    })
  }

  /// Apply a fetch completion. Returns the updated snapshot, or `None`
  /// when the completion was superseded (or the entry disappeared) and
  /// the store was left untouched.
  pub(crate) fn settle_fetch(
    &self,
    key: &QueryKey,
    generation: u64,
    outcome: &FetchOutcome,
  ) -> Option<QuerySnapshot> {
    let mut entries = self.lock();
    let entry = entries.get_mut(key.cache_hash())?;
    if entry.generation != generation {
      debug!(key = %key, "discarding superseded fetch result");
      return None;
    }

    entry.inflight = None;
    entry.last_touched = Instant::now();
    match outcome {
      Ok(data) => {
        entry.data = Some(Arc::clone(data));
        entry.error = None;
        entry.invalidated = false;
        entry.fetched_at = Some(Utc::now());
        entry.fetched_instant = Some(Instant::now());
      }
      Err(error) => {
        // Keep the previous data visible; a failed refetch must not blank
        // the consumer's view. The invalidated flag also stays, so the
        // next query retries.
        entry.error = Some(error.clone());
      }
    }
    Some(entry.snapshot())
  }
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key(v: Value) -> QueryKey {
    QueryKey::from(v)
  }

  #[test]
  fn test_set_then_get_round_trips() {
    let store = CacheStore::new();
    let k = key(json!(["x"]));

    store.set(&k, EntryPatch::data(json!({ "v": 1 })));

    let snap = store.get(&k).unwrap();
    assert_eq!(snap.data.as_deref(), Some(&json!({ "v": 1 })));
    assert!(snap.fetched_at.is_some());
    assert!(!snap.is_fetching);
    assert!(!snap.is_stale);
  }

  #[test]
  fn test_patch_merges_into_existing_entry() {
    let store = CacheStore::new();
    let k = key(json!(["x"]));

    store.set(&k, EntryPatch::data(json!(1)));
    store.set(&k, EntryPatch::error(QueryError::Fetch("down".into())));

    let snap = store.get(&k).unwrap();
    assert_eq!(snap.data.as_deref(), Some(&json!(1)));
    assert_eq!(snap.error, Some(QueryError::Fetch("down".into())));
  }

  #[test]
  fn test_invalidate_is_prefix_matched_and_preserves_data() {
    let store = CacheStore::new();
    let list_a = key(json!(["mlModels", "list", { "filters": { "status": "Active" } }]));
    let list_b = key(json!(["mlModels", "list", { "filters": {} }]));
    let sources = key(json!(["dataSources", "list"]));

    for k in [&list_a, &list_b, &sources] {
      store.set(k, EntryPatch::data(json!([])));
    }

    let affected = store.invalidate(&[key(json!(["mlModels"]))]);
    assert_eq!(affected.len(), 2);

    for k in [&list_a, &list_b] {
      let snap = store.get(k).unwrap();
      assert!(snap.is_stale);
      assert!(snap.has_data());
    }
    assert!(!store.get(&sources).unwrap().is_stale);
  }

  #[test]
  fn test_stale_window_expiry() {
    let store = CacheStore::new();
    let k = key(json!(["x"]));
    store.set(
      &k,
      EntryPatch::data(json!(1)).stale_time(Duration::ZERO),
    );

    std::thread::sleep(Duration::from_millis(5));
    assert!(store.get(&k).unwrap().is_stale);
  }

  #[test]
  fn test_remove_and_clear() {
    let store = CacheStore::new();
    let k = key(json!(["x"]));
    store.set(&k, EntryPatch::data(json!(1)));

    assert!(store.remove(&k));
    assert!(!store.remove(&k));
    assert!(store.get(&k).is_none());

    store.set(&k, EntryPatch::data(json!(1)));
    store.clear();
    assert!(store.is_empty());
  }

  #[test]
  fn test_evict_idle_spares_exempt_entries() {
    let store = CacheStore::new();
    let watched = key(json!(["watched"]));
    let idle = key(json!(["idle"]));
    store.set(&watched, EntryPatch::data(json!(1)));
    store.set(&idle, EntryPatch::data(json!(2)));

    std::thread::sleep(Duration::from_millis(5));
    let evicted = store.evict_idle(Duration::ZERO, |k| k == &watched);

    assert_eq!(evicted, 1);
    assert!(store.get(&watched).is_some());
    assert!(store.get(&idle).is_none());
  }
}
