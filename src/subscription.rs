//! Observer registry: pushes cache-entry snapshots to interested parties.
//!
//! Observers register a callback against a key and receive a snapshot
//! whenever an entry under that key (exact or prefix match) changes. The
//! registry is deliberately framework-free; a UI binding layer is a thin
//! adapter over `subscribe` plus the pull-based `get` on the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::key::QueryKey;
use crate::snapshot::QuerySnapshot;

type ObserverFn = Arc<dyn Fn(&QuerySnapshot) + Send + Sync>;

struct Observer {
  key: QueryKey,
  callback: ObserverFn,
  live: Arc<AtomicBool>,
}

/// Registry of per-key observers.
///
/// Clones share the same observer list.
#[derive(Clone)]
pub struct SubscriptionRegistry {
  observers: Arc<Mutex<Vec<Observer>>>,
}

impl SubscriptionRegistry {
  pub fn new() -> Self {
    Self {
      observers: Arc::new(Mutex::new(Vec::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<Observer>> {
    self.observers.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register `callback` for changes to entries under `key`.
  ///
  /// Delivery stops when the returned [`Subscription`] is dropped or
  /// explicitly unsubscribed, including for notification passes already
  /// in progress.
  pub fn subscribe(
    &self,
    key: QueryKey,
    callback: impl Fn(&QuerySnapshot) + Send + Sync + 'static,
  ) -> Subscription {
    let live = Arc::new(AtomicBool::new(true));
    let mut observers = self.lock();
    observers.retain(|o| o.live.load(Ordering::SeqCst));
    observers.push(Observer {
      key,
      callback: Arc::new(callback),
      live: Arc::clone(&live),
    });
    Subscription { live }
  }

  /// Deliver `snapshot` to every live observer whose key addresses it.
  ///
  /// The observer list is snapshotted before iteration and each liveness
  /// flag is re-checked immediately before its callback runs, so a
  /// callback that unsubscribes another observer (or itself) neither
  /// panics nor causes the removed observer to fire in this pass.
  pub fn notify(&self, snapshot: &QuerySnapshot) {
    let targets: Vec<(Arc<AtomicBool>, ObserverFn)> = {
      let observers = self.lock();
      observers
        .iter()
        .filter(|o| o.live.load(Ordering::SeqCst) && o.key.matches(&snapshot.key))
        .map(|o| (Arc::clone(&o.live), Arc::clone(&o.callback)))
        .collect()
    };

    trace!(key = %snapshot.key, observers = targets.len(), "notifying observers");
    for (live, callback) in targets {
      if live.load(Ordering::SeqCst) {
        callback(snapshot);
      }
    }
  }

  /// True if any live observer addresses `key`.
  pub fn is_watched(&self, key: &QueryKey) -> bool {
    let observers = self.lock();
    observers
      .iter()
      .any(|o| o.live.load(Ordering::SeqCst) && o.key.matches(key))
  }

  /// Number of live observers.
  pub fn len(&self) -> usize {
    let observers = self.lock();
    observers
      .iter()
      .filter(|o| o.live.load(Ordering::SeqCst))
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for SubscriptionRegistry {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle to an active observer registration. Dropping it unsubscribes,
/// which also suppresses delivery of results that land after the owner is
/// gone.
pub struct Subscription {
  live: Arc<AtomicBool>,
}

impl Subscription {
  /// Stop delivery. Equivalent to dropping the handle.
  pub fn unsubscribe(self) {
    self.live.store(false, Ordering::SeqCst);
  }

  pub fn is_active(&self) -> bool {
    self.live.load(Ordering::SeqCst)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.live.store(false, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::AtomicU32;

  fn snapshot(key: QueryKey) -> QuerySnapshot {
    QuerySnapshot {
      key,
      data: None,
      error: None,
      fetched_at: None,
      is_fetching: false,
      is_stale: true,
    }
  }

  #[test]
  fn test_exact_and_prefix_delivery() {
    let registry = SubscriptionRegistry::new();
    let root_calls = Arc::new(AtomicU32::new(0));
    let leaf_calls = Arc::new(AtomicU32::new(0));

    let root_counter = Arc::clone(&root_calls);
    let _root = registry.subscribe(QueryKey::from(json!(["mlModels"])), move |_| {
      root_counter.fetch_add(1, Ordering::SeqCst);
    });
    let leaf_counter = Arc::clone(&leaf_calls);
    let _leaf = registry.subscribe(QueryKey::from(json!(["mlModels", "list"])), move |_| {
      leaf_counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify(&snapshot(QueryKey::from(json!(["mlModels", "list"]))));
    assert_eq!(root_calls.load(Ordering::SeqCst), 1);
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 1);

    registry.notify(&snapshot(QueryKey::from(json!(["dataSources"]))));
    assert_eq!(root_calls.load(Ordering::SeqCst), 1);
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_unsubscribe_during_notification_skips_removed_observer() {
    let registry = SubscriptionRegistry::new();
    let key = QueryKey::from(json!(["y"]));

    let b_calls = Arc::new(AtomicU32::new(0));
    let b_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    // Observer A unsubscribes B from inside its callback.
    let slot = Arc::clone(&b_slot);
    let _a = registry.subscribe(key.clone(), move |_| {
      if let Some(sub) = slot.lock().unwrap().take() {
        sub.unsubscribe();
      }
    });

    let b_counter = Arc::clone(&b_calls);
    let b = registry.subscribe(key.clone(), move |_| {
      b_counter.fetch_add(1, Ordering::SeqCst);
    });
    *b_slot.lock().unwrap() = Some(b);

    registry.notify(&snapshot(key.clone()));
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);

    // B stays gone on later passes too.
    registry.notify(&snapshot(key));
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_dropped_subscription_stops_delivery() {
    let registry = SubscriptionRegistry::new();
    let key = QueryKey::from(json!(["z"]));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let sub = registry.subscribe(key.clone(), move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify(&snapshot(key.clone()));
    drop(sub);
    registry.notify(&snapshot(key.clone()));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!registry.is_watched(&key));
  }
}
