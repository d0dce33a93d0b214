//! Write path: mutations and the invalidation cascade they declare.
//!
//! A mutation runs an arbitrary write operation. On success the declared
//! key set is invalidated and watched entries refetch in the background;
//! on failure the error propagates and the cache is left untouched. There
//! are no optimistic updates and therefore no rollback machinery.

use std::future::Future;
use tracing::debug;

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::key::QueryKey;

/// Declares which cache entries a successful mutation makes stale.
///
/// Keys match hierarchically: invalidating `["mlModels"]` covers every
/// entry under it.
#[derive(Debug, Clone, Default)]
pub struct MutationDescriptor {
  invalidates: Vec<QueryKey>,
}

impl MutationDescriptor {
  /// Descriptor that invalidates nothing.
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a key (or key prefix) to invalidate on success.
  pub fn invalidates(mut self, key: QueryKey) -> Self {
    self.invalidates.push(key);
    self
  }

  pub fn invalidated_keys(&self) -> &[QueryKey] {
    &self.invalidates
  }
}

impl QueryClient {
  /// Run a write operation.
  ///
  /// On success the descriptor's keys are invalidated and watched entries
  /// are scheduled for refetch (not awaited) before the result is
  /// returned. On failure nothing is invalidated.
  pub async fn mutate<R, F, Fut>(
    &self,
    op: F,
    descriptor: MutationDescriptor,
  ) -> Result<R, QueryError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, String>>,
  {
    match op().await {
      Ok(result) => {
        debug!(
          invalidates = descriptor.invalidates.len(),
          "mutation succeeded"
        );
        self.invalidate(&descriptor.invalidates);
        Ok(result)
      }
      Err(message) => Err(QueryError::Mutation(message)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::time::sleep;

  fn key(name: &str) -> QueryKey {
    QueryKey::from(json!([name]))
  }

  #[test]
  fn test_descriptor_accumulates_keys() {
    let descriptor = MutationDescriptor::new()
      .invalidates(key("a"))
      .invalidates(key("b"));
    assert_eq!(descriptor.invalidated_keys().len(), 2);
  }

  #[tokio::test]
  async fn test_successful_mutation_refetches_watched_keys() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let fetcher = move || {
      let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
      async move { Ok::<_, String>(n) }
    };

    let first: u32 = client.query(key("x"), fetcher).await.unwrap();
    assert_eq!(first, 1);
    let _sub = client.subscribe(key("x"), |_| {});

    client
      .mutate(
        || async { Ok::<_, String>(()) },
        MutationDescriptor::new().invalidates(key("x")),
      )
      .await
      .unwrap();

    // The refetch is registered synchronously with mutation completion,
    // without the mutation caller touching `query`.
    assert!(client.get(&key("x")).unwrap().is_fetching);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(client.get(&key("x")).unwrap().data_as::<u32>(), Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_prefix_invalidation_reaches_subtree_entries() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let list_key = QueryKey::from(json!(["mlModels", "list", { "filters": {} }]));
    let counter = Arc::clone(&calls);
    let fetcher = move || {
      let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
      async move { Ok::<_, String>(vec![n]) }
    };

    let _: Vec<u32> = client.query(list_key.clone(), fetcher).await.unwrap();
    let _sub = client.subscribe(QueryKey::from(json!(["mlModels"])), |_| {});

    client
      .mutate(
        || async { Ok::<_, String>("created".to_string()) },
        MutationDescriptor::new().invalidates(QueryKey::from(json!(["mlModels"]))),
      )
      .await
      .unwrap();

    let snap = client.get(&list_key).unwrap();
    assert!(snap.is_stale);
    assert!(snap.is_fetching);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(
      client.get(&list_key).unwrap().data_as::<Vec<u32>>(),
      Some(vec![2])
    );
  }

  #[tokio::test]
  async fn test_failed_mutation_invalidates_nothing() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let fetcher = move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async move { Ok::<_, String>(1u32) }
    };

    let _: u32 = client.query(key("x"), fetcher).await.unwrap();

    let result: Result<(), _> = client
      .mutate(
        || async { Err("rejected".to_string()) },
        MutationDescriptor::new().invalidates(key("x")),
      )
      .await;

    assert_eq!(result, Err(QueryError::Mutation("rejected".into())));
    let snap = client.get(&key("x")).unwrap();
    assert!(!snap.is_stale);
    assert!(!snap.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
