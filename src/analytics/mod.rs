//! Typed client for the analytics API: ML models and data sources.
//!
//! [`AnalyticsClient`] speaks the REST API directly; wrap it in
//! [`CachedAnalyticsClient`] to get cached reads and invalidation-aware
//! writes through the query cache core.

mod cached_client;
mod client;
pub mod keys;
mod types;

pub use cached_client::CachedAnalyticsClient;
pub use client::{AnalyticsClient, ApiError};
pub use types::*;
