//! Error types for the query cache.

use thiserror::Error;

/// Errors surfaced by queries and mutations.
///
/// The type is `Clone` because a single fetch outcome fans out to every
/// caller that joined the in-flight request, and it is stored on the cache
/// entry for observers to read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  /// The fetcher rejected. Carries the fetcher's error message.
  #[error("fetch failed: {0}")]
  Fetch(String),

  /// A mutation operation rejected. Nothing was invalidated.
  #[error("mutation failed: {0}")]
  Mutation(String),

  /// A value could not be converted to or from its cached JSON
  /// representation.
  #[error("cache value conversion failed: {0}")]
  Decode(String),

  /// The in-flight fetch went away without producing an outcome.
  #[error("query was cancelled")]
  Cancelled,
}

impl QueryError {
  /// True if this is a fetch rejection (as opposed to an internal failure).
  pub fn is_fetch(&self) -> bool {
    matches!(self, QueryError::Fetch(_))
  }
}
