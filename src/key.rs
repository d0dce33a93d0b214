//! Query keys: the ordered, serializable identities cache entries live under.
//!
//! A key is a list of JSON segments, e.g. `["mlModels", "list", {filters}]`.
//! Keys form a hierarchy by prefix: `["mlModels"]` addresses the whole
//! subtree of model queries, which is what invalidation and observer
//! matching operate on.
//!
//! Equality is over the normalized serialized form. Object segments are
//! serialized with sorted fields (the serde_json map is ordered), so
//! `{"a":1,"b":2}` and `{"b":2,"a":1}` address the same entry.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity used to address a cache entry.
#[derive(Clone, Debug)]
pub struct QueryKey {
  segments: Vec<Value>,
  hash: String,
}

impl QueryKey {
  /// Create a key from a list of JSON segments.
  pub fn new(segments: Vec<Value>) -> Self {
    let hash = hash_segments(&segments);
    Self { segments, hash }
  }

  /// Append a segment, producing the child key.
  ///
  /// ```ignore
  /// let lists = QueryKey::from(json!(["mlModels"])).push(json!("list"));
  /// ```
  pub fn push(mut self, segment: Value) -> Self {
    self.segments.push(segment);
    self.hash = hash_segments(&self.segments);
    self
  }

  /// The key's segments in order.
  pub fn segments(&self) -> &[Value] {
    &self.segments
  }

  /// Stable, fixed-length identity hash (SHA-256 hex of the normalized
  /// serialization). Used as the storage map key.
  pub fn cache_hash(&self) -> &str {
    &self.hash
  }

  /// True if `other` lives strictly below this key in the hierarchy.
  pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
    self.segments.len() < other.segments.len()
      && self
        .segments
        .iter()
        .zip(other.segments.iter())
        .all(|(a, b)| a == b)
  }

  /// True if this key addresses `other`: exact match or prefix match.
  pub fn matches(&self, other: &QueryKey) -> bool {
    self == other || self.is_prefix_of(other)
  }
}

impl PartialEq for QueryKey {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash
  }
}

impl Eq for QueryKey {}

impl std::hash::Hash for QueryKey {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.hash.hash(state);
  }
}

impl From<Value> for QueryKey {
  /// An array value becomes the segment list; any other value becomes a
  /// single-segment key.
  fn from(value: Value) -> Self {
    match value {
      Value::Array(segments) => Self::new(segments),
      other => Self::new(vec![other]),
    }
  }
}

impl From<&str> for QueryKey {
  fn from(segment: &str) -> Self {
    Self::new(vec![Value::String(segment.to_string())])
  }
}

impl fmt::Display for QueryKey {
  /// Human-readable description for logs, e.g. `mlModels/list/{"filters":{}}`.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for segment in &self.segments {
      if !first {
        write!(f, "/")?;
      }
      first = false;
      match segment {
        Value::String(s) => write!(f, "{}", s)?,
        other => write!(f, "{}", other)?,
      }
    }
    Ok(())
  }
}

/// SHA-256 hex over the serialized segment list.
fn hash_segments(segments: &[Value]) -> String {
  let mut hasher = Sha256::new();
  for segment in segments {
    // to_string on a Value cannot fail; maps serialize with sorted keys.
    hasher.update(segment.to_string().as_bytes());
    hasher.update([0x1f]);
  }
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_object_field_order_is_normalized() {
    let a = QueryKey::from(json!(["models", "list", { "a": 1, "b": 2 }]));
    let b = QueryKey::from(json!(["models", "list", { "b": 2, "a": 1 }]));
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_prefix_matching() {
    let root = QueryKey::from(json!(["mlModels"]));
    let list = QueryKey::from(json!(["mlModels", "list", { "filters": {} }]));
    let other = QueryKey::from(json!(["dataSources"]));

    assert!(root.is_prefix_of(&list));
    assert!(root.matches(&list));
    assert!(root.matches(&root));
    assert!(!root.is_prefix_of(&root));
    assert!(!root.matches(&other));
    assert!(!list.is_prefix_of(&root));
  }

  #[test]
  fn test_segment_boundaries_are_distinct() {
    // ["ab"] and ["a", "b"] must not collide.
    let joined = QueryKey::from(json!(["ab"]));
    let split = QueryKey::from(json!(["a", "b"]));
    assert_ne!(joined, split);
  }

  #[test]
  fn test_display_and_hash_shape() {
    let key = QueryKey::from(json!(["mlModels", "detail", "42"]));
    assert_eq!(key.to_string(), "mlModels/detail/42");
    assert_eq!(key.cache_hash().len(), 64);
  }
}
