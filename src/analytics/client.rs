//! REST client for the analytics API.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::types::{
  ConnectionTest, CreateModelRequest, DataSource, DataSourceRequest, MlModel, ModelDeployment,
  ModelFilters, ModelMetrics, ModelPrediction, PredictionRequest, TrainingRequest,
  UpdateModelRequest,
};

/// Errors from the analytics API client.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid analytics API url: {0}")]
  Url(#[from] url::ParseError),

  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("analytics API returned {status} for {path}")]
  Status { status: StatusCode, path: String },
}

/// Analytics API client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct AnalyticsClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: String,
}

impl AnalyticsClient {
  /// Create a client for the API at `base_url`, authenticating with a
  /// bearer token.
  pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ApiError> {
    // A trailing slash makes Url::join treat the last path segment as a
    // directory.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };

    Ok(Self {
      http: reqwest::Client::new(),
      base_url: Url::parse(&normalized)?,
      api_key: api_key.into(),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    Ok(self.base_url.join(path)?)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
    let path = url.path().to_string();
    let response = self
      .http
      .get(url)
      .bearer_auth(&self.api_key)
      .send()
      .await?;
    Self::decode(response, path).await
  }

  async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    url: Url,
    body: &B,
  ) -> Result<T, ApiError> {
    let path = url.path().to_string();
    let response = self
      .http
      .post(url)
      .bearer_auth(&self.api_key)
      .json(body)
      .send()
      .await?;
    Self::decode(response, path).await
  }

  async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    url: Url,
    body: &B,
  ) -> Result<T, ApiError> {
    let path = url.path().to_string();
    let response = self
      .http
      .put(url)
      .bearer_auth(&self.api_key)
      .json(body)
      .send()
      .await?;
    Self::decode(response, path).await
  }

  async fn delete(&self, url: Url) -> Result<(), ApiError> {
    let path = url.path().to_string();
    let response = self
      .http
      .delete(url)
      .bearer_auth(&self.api_key)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(ApiError::Status {
        status: response.status(),
        path,
      });
    }
    Ok(())
  }

  async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    path: String,
  ) -> Result<T, ApiError> {
    if !response.status().is_success() {
      return Err(ApiError::Status {
        status: response.status(),
        path,
      });
    }
    Ok(response.json().await?)
  }

  /// List models, optionally narrowed by filters.
  pub async fn list_models(&self, filters: &ModelFilters) -> Result<Vec<MlModel>, ApiError> {
    let mut url = self.endpoint("models")?;
    {
      let mut query = url.query_pairs_mut();
      if let Some(status) = filters.status {
        query.append_pair("status", status.as_str());
      }
      if let Some(model_type) = filters.model_type {
        query.append_pair("type", model_type.as_str());
      }
      if let Some(tag) = &filters.tag {
        query.append_pair("tag", tag);
      }
    }
    self.get_json(url).await
  }

  /// Fetch a single model by id.
  pub async fn get_model(&self, id: &str) -> Result<MlModel, ApiError> {
    let url = self.endpoint(&format!("models/{}", id))?;
    self.get_json(url).await
  }

  /// Full-text search over models.
  pub async fn search_models(&self, query: &str) -> Result<Vec<MlModel>, ApiError> {
    let mut url = self.endpoint("models/search")?;
    url.query_pairs_mut().append_pair("q", query);
    self.get_json(url).await
  }

  /// Create a model.
  pub async fn create_model(&self, request: &CreateModelRequest) -> Result<MlModel, ApiError> {
    let url = self.endpoint("models")?;
    self.post_json(url, request).await
  }

  /// Update a model's mutable fields.
  pub async fn update_model(
    &self,
    id: &str,
    request: &UpdateModelRequest,
  ) -> Result<MlModel, ApiError> {
    let url = self.endpoint(&format!("models/{}", id))?;
    self.put_json(url, request).await
  }

  /// Delete a model.
  pub async fn delete_model(&self, id: &str) -> Result<(), ApiError> {
    let url = self.endpoint(&format!("models/{}", id))?;
    self.delete(url).await
  }

  /// Kick off a training run.
  pub async fn start_training(&self, request: &TrainingRequest) -> Result<MlModel, ApiError> {
    let url = self.endpoint(&format!("models/{}/train", request.model_id))?;
    self.post_json(url, request).await
  }

  /// Flip a model between active and paused.
  pub async fn toggle_model_status(&self, id: &str) -> Result<MlModel, ApiError> {
    let url = self.endpoint(&format!("models/{}/toggle", id))?;
    self.post_json(url, &()).await
  }

  /// Deploy a model behind a serving endpoint.
  pub async fn deploy_model(&self, id: &str) -> Result<ModelDeployment, ApiError> {
    let url = self.endpoint(&format!("models/{}/deploy", id))?;
    self.post_json(url, &()).await
  }

  /// Run a prediction against a deployed model.
  pub async fn predict(&self, request: &PredictionRequest) -> Result<ModelPrediction, ApiError> {
    let url = self.endpoint(&format!("models/{}/predict", request.model_id))?;
    self.post_json(url, request).await
  }

  /// Metrics history for a model over the trailing `days`.
  pub async fn model_metrics(&self, id: &str, days: u32) -> Result<Vec<ModelMetrics>, ApiError> {
    let mut url = self.endpoint(&format!("models/{}/metrics", id))?;
    url
      .query_pairs_mut()
      .append_pair("days", &days.to_string());
    self.get_json(url).await
  }

  /// List all data sources.
  pub async fn list_sources(&self) -> Result<Vec<DataSource>, ApiError> {
    let url = self.endpoint("data-sources")?;
    self.get_json(url).await
  }

  /// Fetch a single data source by id.
  pub async fn get_source(&self, id: u64) -> Result<DataSource, ApiError> {
    let url = self.endpoint(&format!("data-sources/{}", id))?;
    self.get_json(url).await
  }

  /// Register a data source.
  pub async fn create_source(&self, request: &DataSourceRequest) -> Result<DataSource, ApiError> {
    let url = self.endpoint("data-sources")?;
    self.post_json(url, request).await
  }

  /// Update a data source's configuration.
  pub async fn update_source(
    &self,
    id: u64,
    request: &DataSourceRequest,
  ) -> Result<DataSource, ApiError> {
    let url = self.endpoint(&format!("data-sources/{}", id))?;
    self.put_json(url, request).await
  }

  /// Remove a data source.
  pub async fn delete_source(&self, id: u64) -> Result<(), ApiError> {
    let url = self.endpoint(&format!("data-sources/{}", id))?;
    self.delete(url).await
  }

  /// Probe a data source's connection.
  pub async fn test_connection(&self, id: u64) -> Result<ConnectionTest, ApiError> {
    let url = self.endpoint(&format!("data-sources/{}/test", id))?;
    self.post_json(url, &()).await
  }

  /// Trigger an immediate sync.
  pub async fn sync_source(&self, id: u64) -> Result<DataSource, ApiError> {
    let url = self.endpoint(&format!("data-sources/{}/sync", id))?;
    self.post_json(url, &()).await
  }
}
