//! requery: an async query cache with stale-while-revalidate semantics.
//!
//! The crate centers on [`QueryClient`]: keyed storage of fetched results,
//! staleness windows, de-duplication of concurrent fetches for the same
//! key, mutation-driven invalidation cascades, and an observer registry
//! that pushes [`QuerySnapshot`]s to interested parties.
//!
//! ```ignore
//! let client = QueryClient::new();
//!
//! // Reads go through `query`; concurrent calls for one key share a fetch.
//! let models: Vec<MlModel> = client
//!   .query(keys::model_lists(), fetch_models)
//!   .await?;
//!
//! // Writes declare what they make stale; watched keys refetch on their
//! // own while previously fetched data stays visible.
//! client
//!   .mutate(create_model, MutationDescriptor::new().invalidates(keys::model_lists()))
//!   .await?;
//! ```
//!
//! The [`analytics`] module is the first-party consumer: a typed client
//! for the analytics API (ML models, data sources) with a cached facade
//! built on the core.

pub mod analytics;

mod client;
mod error;
mod key;
mod mutation;
mod snapshot;
mod store;
mod subscription;

pub use client::{QueryClient, QueryOptions};
pub use error::QueryError;
pub use key::QueryKey;
pub use mutation::MutationDescriptor;
pub use snapshot::{QueryState, QuerySnapshot};
pub use store::{CacheStore, EntryPatch};
pub use subscription::{Subscription, SubscriptionRegistry};
