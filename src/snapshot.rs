//! Immutable views of cache entries handed to callers and observers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::QueryError;
use crate::key::QueryKey;

/// Lifecycle state of a cache entry.
///
/// Keys move `Idle -> Fetching -> Success | Error`; invalidation sends a
/// settled key back to `Fetching` while its previous data stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
  /// Entry exists but has never fetched.
  Idle,
  /// A fetch is in flight. Previously fetched data may still be present.
  Fetching,
  /// The last fetch succeeded.
  Success,
  /// The last fetch failed. Data from an earlier success may still be
  /// present.
  Error,
}

impl QueryState {
  pub fn is_fetching(&self) -> bool {
    matches!(self, QueryState::Fetching)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error)
  }
}

/// Point-in-time view of a cache entry.
///
/// Snapshots are cheap to clone (the payload is shared) and carry
/// everything an observer needs to render: last-known-good data, the last
/// error, staleness, and whether a refetch is running.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
  /// The key this entry lives under.
  pub key: QueryKey,
  /// Data from the most recent successful fetch, if any.
  pub data: Option<Arc<Value>>,
  /// Error from the most recent failed fetch, cleared on success.
  pub error: Option<QueryError>,
  /// When the data was last successfully fetched.
  pub fetched_at: Option<DateTime<Utc>>,
  /// Whether a fetch is currently in flight for this key.
  pub is_fetching: bool,
  /// Whether the data is past its stale window or has been invalidated.
  pub is_stale: bool,
}

impl QuerySnapshot {
  /// Derive the lifecycle state from the entry fields.
  pub fn state(&self) -> QueryState {
    if self.is_fetching {
      QueryState::Fetching
    } else if self.error.is_some() {
      QueryState::Error
    } else if self.data.is_some() {
      QueryState::Success
    } else {
      QueryState::Idle
    }
  }

  pub fn has_data(&self) -> bool {
    self.data.is_some()
  }

  /// Decode the cached data into a concrete type.
  ///
  /// Returns `None` when there is no data or it does not decode into `T`.
  pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
    let value = self.data.as_ref()?;
    serde_json::from_value(Value::clone(value)).ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn snapshot(data: Option<Value>, error: Option<QueryError>, fetching: bool) -> QuerySnapshot {
    QuerySnapshot {
      key: QueryKey::from(json!(["t"])),
      data: data.map(Arc::new),
      error,
      fetched_at: None,
      is_fetching: fetching,
      is_stale: false,
    }
  }

  #[test]
  fn test_state_derivation() {
    assert_eq!(snapshot(None, None, false).state(), QueryState::Idle);
    assert_eq!(snapshot(None, None, true).state(), QueryState::Fetching);
    assert_eq!(snapshot(Some(json!(1)), None, false).state(), QueryState::Success);
    // Stale data plus a failed refetch still reads as Error.
    let failed = snapshot(Some(json!(1)), Some(QueryError::Fetch("boom".into())), false);
    assert_eq!(failed.state(), QueryState::Error);
    assert!(failed.has_data());
  }

  #[test]
  fn test_typed_decode() {
    let snap = snapshot(Some(json!({ "id": "1", "n": 3 })), None, false);
    #[derive(serde::Deserialize)]
    struct Row {
      id: String,
      n: u32,
    }
    let row: Row = snap.data_as().unwrap();
    assert_eq!(row.id, "1");
    assert_eq!(row.n, 3);
    assert!(snap.data_as::<Vec<u8>>().is_none());
  }
}
