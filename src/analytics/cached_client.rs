//! Cached analytics client: the API client wired through the query cache.
//!
//! Read paths declare their stale windows; write paths declare the key
//! subtrees they make stale. Observers subscribed through the underlying
//! [`QueryClient`] see every transition the writes cause.

use std::time::Duration;

use crate::analytics::client::{AnalyticsClient, ApiError};
use crate::analytics::keys;
use crate::analytics::types::{
  ConnectionTest, CreateModelRequest, DataSource, DataSourceRequest, MlModel, ModelDeployment,
  ModelFilters, ModelMetrics, ModelPrediction, PredictionRequest, TrainingRequest,
  UpdateModelRequest,
};
use crate::client::{QueryClient, QueryOptions};
use crate::error::QueryError;
use crate::mutation::MutationDescriptor;

/// Stale windows per query family.
const LIST_STALE: Duration = Duration::from_secs(5 * 60);
const METRICS_STALE: Duration = Duration::from_secs(2 * 60);
const SEARCH_STALE: Duration = Duration::from_secs(60);

/// Analytics client with transparent caching.
///
/// Wraps [`AnalyticsClient`] with the same surface, but reads serve from
/// cache inside their stale window and writes invalidate the affected key
/// subtrees so watched queries refetch on their own.
#[derive(Clone)]
pub struct CachedAnalyticsClient {
  inner: AnalyticsClient,
  cache: QueryClient,
}

impl CachedAnalyticsClient {
  /// Wrap an API client with a fresh cache.
  pub fn new(inner: AnalyticsClient) -> Self {
    Self::with_cache(inner, QueryClient::new())
  }

  /// Wrap an API client with an existing cache (shared across facades or
  /// pre-seeded in tests).
  pub fn with_cache(inner: AnalyticsClient, cache: QueryClient) -> Self {
    Self { inner, cache }
  }

  /// The underlying cache, for `subscribe`/`get` and manual invalidation.
  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  /// List models matching `filters`, cached per filter set.
  pub async fn models(&self, filters: &ModelFilters) -> Result<Vec<MlModel>, QueryError> {
    let inner = self.inner.clone();
    let owned = filters.clone();
    self
      .cache
      .query_with(
        keys::model_list(filters),
        move || {
          let inner = inner.clone();
          let filters = owned.clone();
          async move { inner.list_models(&filters).await.map_err(|e| e.to_string()) }
        },
        QueryOptions::new().stale_time(LIST_STALE),
      )
      .await
  }

  /// Fetch a single model, cached under its detail key.
  pub async fn model(&self, id: &str) -> Result<MlModel, QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .query(keys::model_detail(id), move || {
        let inner = inner.clone();
        let id = id_owned.clone();
        async move { inner.get_model(&id).await.map_err(|e| e.to_string()) }
      })
      .await
  }

  /// Metrics history for a model.
  pub async fn model_metrics(&self, id: &str, days: u32) -> Result<Vec<ModelMetrics>, QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .query_with(
        keys::model_metrics(id, days),
        move || {
          let inner = inner.clone();
          let id = id_owned.clone();
          async move { inner.model_metrics(&id, days).await.map_err(|e| e.to_string()) }
        },
        QueryOptions::new().stale_time(METRICS_STALE),
      )
      .await
  }

  /// Search models, cached per query string.
  pub async fn search_models(&self, query: &str) -> Result<Vec<MlModel>, QueryError> {
    let inner = self.inner.clone();
    let owned = query.to_string();
    self
      .cache
      .query_with(
        keys::model_search(query),
        move || {
          let inner = inner.clone();
          let query = owned.clone();
          async move { inner.search_models(&query).await.map_err(|e| e.to_string()) }
        },
        QueryOptions::new().stale_time(SEARCH_STALE),
      )
      .await
  }

  /// Create a model; every model list refetches.
  pub async fn create_model(&self, request: CreateModelRequest) -> Result<MlModel, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move { inner.create_model(&request).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new().invalidates(keys::model_lists()),
      )
      .await
  }

  /// Update a model; its detail and every list refetch.
  pub async fn update_model(
    &self,
    id: &str,
    request: UpdateModelRequest,
  ) -> Result<MlModel, QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .mutate(
        move || async move {
          inner
            .update_model(&id_owned, &request)
            .await
            .map_err(|e| e.to_string())
        },
        MutationDescriptor::new()
          .invalidates(keys::model_lists())
          .invalidates(keys::model_detail(id)),
      )
      .await
  }

  /// Delete a model; every model list refetches.
  pub async fn delete_model(&self, id: &str) -> Result<(), QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .mutate(
        move || async move { inner.delete_model(&id_owned).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new().invalidates(keys::model_lists()),
      )
      .await
  }

  /// Start a training run; the model's detail (and its metrics beneath
  /// it) plus every list refetch.
  pub async fn start_training(&self, request: TrainingRequest) -> Result<MlModel, QueryError> {
    let inner = self.inner.clone();
    let descriptor = MutationDescriptor::new()
      .invalidates(keys::model_lists())
      .invalidates(keys::model_detail(&request.model_id));
    self
      .cache
      .mutate(
        move || async move { inner.start_training(&request).await.map_err(|e| e.to_string()) },
        descriptor,
      )
      .await
  }

  /// Toggle a model between active and paused.
  pub async fn toggle_model_status(&self, id: &str) -> Result<MlModel, QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .mutate(
        move || async move {
          inner
            .toggle_model_status(&id_owned)
            .await
            .map_err(|e| e.to_string())
        },
        MutationDescriptor::new()
          .invalidates(keys::model_lists())
          .invalidates(keys::model_detail(id)),
      )
      .await
  }

  /// Deploy a model behind a serving endpoint.
  pub async fn deploy_model(&self, id: &str) -> Result<ModelDeployment, QueryError> {
    let inner = self.inner.clone();
    let id_owned = id.to_string();
    self
      .cache
      .mutate(
        move || async move { inner.deploy_model(&id_owned).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new()
          .invalidates(keys::model_lists())
          .invalidates(keys::model_detail(id)),
      )
      .await
  }

  /// Run a prediction. Predictions change no cached state, so nothing is
  /// invalidated.
  pub async fn predict(&self, request: PredictionRequest) -> Result<ModelPrediction, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move { inner.predict(&request).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new(),
      )
      .await
  }

  /// List data sources.
  pub async fn sources(&self) -> Result<Vec<DataSource>, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .query_with(
        keys::source_lists(),
        move || {
          let inner = inner.clone();
          async move { inner.list_sources().await.map_err(|e| e.to_string()) }
        },
        QueryOptions::new().stale_time(LIST_STALE),
      )
      .await
  }

  /// Fetch a single data source.
  pub async fn source(&self, id: u64) -> Result<DataSource, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .query(keys::source_detail(id), move || {
        let inner = inner.clone();
        async move { inner.get_source(id).await.map_err(|e| e.to_string()) }
      })
      .await
  }

  /// Register a data source; the source list refetches.
  pub async fn create_source(&self, request: DataSourceRequest) -> Result<DataSource, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move { inner.create_source(&request).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new().invalidates(keys::source_lists()),
      )
      .await
  }

  /// Update a data source; its detail and the list refetch.
  pub async fn update_source(
    &self,
    id: u64,
    request: DataSourceRequest,
  ) -> Result<DataSource, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move {
          inner
            .update_source(id, &request)
            .await
            .map_err(|e| e.to_string())
        },
        MutationDescriptor::new()
          .invalidates(keys::source_lists())
          .invalidates(keys::source_detail(id)),
      )
      .await
  }

  /// Remove a data source; the source list refetches.
  pub async fn delete_source(&self, id: u64) -> Result<(), QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move { inner.delete_source(id).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new().invalidates(keys::source_lists()),
      )
      .await
  }

  /// Trigger an immediate sync; the source's detail and the list refetch.
  pub async fn sync_source(&self, id: u64) -> Result<DataSource, QueryError> {
    let inner = self.inner.clone();
    self
      .cache
      .mutate(
        move || async move { inner.sync_source(id).await.map_err(|e| e.to_string()) },
        MutationDescriptor::new()
          .invalidates(keys::source_lists())
          .invalidates(keys::source_detail(id)),
      )
      .await
  }

  /// Probe a data source's connection (not cached - a diagnostic, not a
  /// query result anyone renders later).
  pub async fn test_connection(&self, id: u64) -> Result<ConnectionTest, ApiError> {
    self.inner.test_connection(id).await
  }
}
