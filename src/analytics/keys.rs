//! Query-key factories for the analytics API.
//!
//! Keys form two hierarchies, one per resource:
//!
//! ```text
//! mlModels
//! mlModels/list
//! mlModels/list/{"filters":{...}}
//! mlModels/detail
//! mlModels/detail/<id>
//! mlModels/detail/<id>/metrics/<days>
//! mlModels/search/<query>
//! dataSources
//! dataSources/list
//! dataSources/detail/<id>
//! ```
//!
//! Invalidating a parent reaches everything beneath it, which is what the
//! cached client's mutations rely on.

use serde_json::json;

use crate::key::QueryKey;
use crate::analytics::types::ModelFilters;

/// Root of the ML model hierarchy.
pub fn models() -> QueryKey {
  QueryKey::from(json!(["mlModels"]))
}

/// All model list queries, regardless of filters.
pub fn model_lists() -> QueryKey {
  models().push(json!("list"))
}

/// A model list query with concrete filters.
pub fn model_list(filters: &ModelFilters) -> QueryKey {
  model_lists().push(json!({ "filters": filters }))
}

/// All model detail queries.
pub fn model_details() -> QueryKey {
  models().push(json!("detail"))
}

/// Detail query for one model.
pub fn model_detail(id: &str) -> QueryKey {
  model_details().push(json!(id))
}

/// Metrics history for one model over a trailing window of days.
///
/// Lives under the model's detail key so invalidating the detail also
/// invalidates its metrics.
pub fn model_metrics(id: &str, days: u32) -> QueryKey {
  model_detail(id).push(json!("metrics")).push(json!(days))
}

/// Search query over models.
pub fn model_search(query: &str) -> QueryKey {
  models().push(json!("search")).push(json!(query))
}

/// Root of the data source hierarchy.
pub fn sources() -> QueryKey {
  QueryKey::from(json!(["dataSources"]))
}

/// All data source list queries.
pub fn source_lists() -> QueryKey {
  sources().push(json!("list"))
}

/// All data source detail queries.
pub fn source_details() -> QueryKey {
  sources().push(json!("detail"))
}

/// Detail query for one data source.
pub fn source_detail(id: u64) -> QueryKey {
  source_details().push(json!(id))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_model_keys_form_a_hierarchy() {
    let filters = ModelFilters::default();
    assert!(models().is_prefix_of(&model_lists()));
    assert!(model_lists().is_prefix_of(&model_list(&filters)));
    assert!(models().is_prefix_of(&model_detail("1")));
    assert!(model_detail("1").is_prefix_of(&model_metrics("1", 7)));
    assert!(!model_detail("1").matches(&model_detail("2")));
  }

  #[test]
  fn test_resource_hierarchies_are_disjoint() {
    assert!(!models().matches(&sources()));
    assert!(!sources().matches(&model_lists()));
    assert!(!model_lists().matches(&source_lists()));
  }

  #[test]
  fn test_equal_filters_address_the_same_entry() {
    let a = ModelFilters {
      tag: Some("revenue".into()),
      ..ModelFilters::default()
    };
    let b = a.clone();
    assert_eq!(model_list(&a), model_list(&b));
    assert_ne!(model_list(&a), model_list(&ModelFilters::default()));
  }
}
