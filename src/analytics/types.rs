use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of ML model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
  Regression,
  Classification,
  #[serde(rename = "Time Series")]
  TimeSeries,
  Unsupervised,
  #[serde(rename = "Deep Learning")]
  DeepLearning,
  #[serde(rename = "NLP")]
  Nlp,
  #[serde(rename = "Computer Vision")]
  ComputerVision,
}

impl ModelType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ModelType::Regression => "Regression",
      ModelType::Classification => "Classification",
      ModelType::TimeSeries => "Time Series",
      ModelType::Unsupervised => "Unsupervised",
      ModelType::DeepLearning => "Deep Learning",
      ModelType::Nlp => "NLP",
      ModelType::ComputerVision => "Computer Vision",
    }
  }
}

/// Lifecycle status of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
  Active,
  Training,
  Paused,
  Failed,
  Deployed,
  Retired,
}

impl ModelStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ModelStatus::Active => "Active",
      ModelStatus::Training => "Training",
      ModelStatus::Paused => "Paused",
      ModelStatus::Failed => "Failed",
      ModelStatus::Deployed => "Deployed",
      ModelStatus::Retired => "Retired",
    }
  }
}

/// Evaluation metrics reported for a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
  pub precision: f64,
  pub recall: f64,
  pub f1_score: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auc: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mse: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mae: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub r2_score: Option<f64>,
}

/// An ML model as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlModel {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub model_type: ModelType,
  pub status: ModelStatus,
  pub accuracy: f64,
  /// Human-readable recency, e.g. "2 days ago".
  pub last_trained: String,
  pub description: String,
  pub features: Vec<String>,
  pub performance: ModelPerformance,
  pub version: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub training_data_size: u64,
  /// Minutes spent in the last training run.
  pub training_duration: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deployment_endpoint: Option<String>,
  pub tags: Vec<String>,
  pub created_by: String,
  pub is_public: bool,
}

/// Status of a model deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
  Active,
  Inactive,
  Error,
}

/// A deployed model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeployment {
  pub id: String,
  pub model_id: String,
  pub endpoint: String,
  pub status: DeploymentStatus,
  pub created_at: DateTime<Utc>,
  pub last_used: DateTime<Utc>,
  pub request_count: u64,
  pub average_response_time: f64,
}

/// Outcome status of a single prediction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
  Success,
  Error,
}

/// A single prediction made against a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrediction {
  pub id: String,
  pub model_id: String,
  pub input: Value,
  pub output: Value,
  pub confidence: f64,
  pub timestamp: DateTime<Utc>,
  pub status: PredictionStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// One point in a model's metrics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
  pub model_id: String,
  pub timestamp: DateTime<Utc>,
  pub accuracy: f64,
  pub loss: f64,
  pub precision: f64,
  pub recall: f64,
  pub f1_score: f64,
  pub training_time: f64,
  pub inference_time: f64,
}

/// Payload for creating a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelRequest {
  pub name: String,
  #[serde(rename = "type")]
  pub model_type: ModelType,
  pub description: String,
  pub features: Vec<String>,
  pub training_data_id: String,
  pub tags: Vec<String>,
  pub is_public: bool,
}

/// Partial update of a model; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModelRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tags: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_public: Option<bool>,
}

/// Hyperparameters for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
  pub model_id: String,
  pub epochs: u32,
  pub batch_size: u32,
  pub learning_rate: f64,
  pub validation_split: f64,
}

/// Input for a prediction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
  pub model_id: String,
  pub input: Value,
}

/// Filters applied to model list queries. Also part of the cache key, so
/// two calls with the same filters share an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFilters {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ModelStatus>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub model_type: Option<ModelType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
}

/// Connection state of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
  Connected,
  Disconnected,
  Syncing,
  Error,
}

/// Health rollup for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHealth {
  Healthy,
  Warning,
  Error,
}

/// An external data source feeding the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
  pub id: u64,
  pub name: String,
  #[serde(rename = "type")]
  pub source_type: String,
  pub status: SourceStatus,
  /// Human-readable recency, e.g. "30 minutes ago".
  pub last_sync: String,
  /// Approximate record count, e.g. "1.2M".
  pub records: String,
  pub description: String,
  pub health: SourceHealth,
  pub api_url: String,
  /// Sync interval in minutes.
  pub sync_interval: String,
  pub auto_sync: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Payload for creating or updating a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRequest {
  pub name: String,
  #[serde(rename = "type")]
  pub source_type: String,
  pub description: String,
  pub api_url: String,
  pub sync_interval: String,
  pub auto_sync: bool,
}

/// Result of probing a data source's connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
  pub success: bool,
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_model_round_trips_api_json() {
    let payload = json!({
      "id": "1",
      "name": "Revenue Prediction Model v2.1",
      "type": "Regression",
      "status": "Active",
      "accuracy": 94.2,
      "lastTrained": "2 days ago",
      "description": "Predicts monthly revenue",
      "features": ["User engagement", "Seasonal patterns"],
      "performance": {
        "precision": 92.1,
        "recall": 89.7,
        "f1Score": 90.9,
        "mse": 0.15,
        "mae": 0.08,
        "r2Score": 0.94
      },
      "version": "2.1.0",
      "createdAt": "2024-01-15T10:00:00Z",
      "updatedAt": "2024-01-20T14:30:00Z",
      "trainingDataSize": 50000,
      "trainingDuration": 120,
      "deploymentEndpoint": "https://api.example.com/models/revenue-prediction",
      "tags": ["revenue", "prediction"],
      "createdBy": "user1",
      "isPublic": true
    });

    let model: MlModel = serde_json::from_value(payload.clone()).unwrap();
    assert_eq!(model.model_type, ModelType::Regression);
    assert_eq!(model.status, ModelStatus::Active);
    assert_eq!(model.performance.r2_score, Some(0.94));

    let back = serde_json::to_value(&model).unwrap();
    assert_eq!(back, payload);
  }

  #[test]
  fn test_spaced_type_names_serialize_as_api_strings() {
    assert_eq!(
      serde_json::to_value(ModelType::TimeSeries).unwrap(),
      json!("Time Series")
    );
    assert_eq!(
      serde_json::to_value(ModelType::Nlp).unwrap(),
      json!("NLP")
    );
    assert_eq!(ModelType::DeepLearning.as_str(), "Deep Learning");
  }

  #[test]
  fn test_update_request_omits_unset_fields() {
    let update = UpdateModelRequest {
      name: Some("renamed".into()),
      ..UpdateModelRequest::default()
    };
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      json!({ "name": "renamed" })
    );
  }
}
