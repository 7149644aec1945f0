//! Merging of per-request results.
//!
//! Paged APIs answer with `{"results": [...], ...}`. The aggregator concatenates those arrays
//! across every successful response, in submission order, and lists failures next to them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::{FailureKind, FetchOutcome, FetchResult};

/// A failed request, as reported next to the merged records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub kind: FailureKind,
    pub error: String,
}

/// Records from every successful response plus one entry per failed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub combined: Vec<Value>,
    pub errors: Vec<ErrorRecord>,
}

impl AggregatedResults {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultAggregator {
    results_field: String,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new("results")
    }
}

impl ResultAggregator {
    pub fn new(results_field: impl Into<String>) -> Self {
        Self {
            results_field: results_field.into(),
        }
    }

    pub fn results_field(&self) -> &str {
        &self.results_field
    }

    /// Merge results in the order given.
    ///
    /// Skipped requests contribute nothing. A success whose payload has no array under the
    /// results field is ignored.
    pub fn merge(&self, results: &[FetchResult]) -> AggregatedResults {
        let mut merged = AggregatedResults::default();

        for result in results {
            match &result.outcome {
                FetchOutcome::Success { payload } => {
                    match payload.get(&self.results_field).and_then(Value::as_array) {
                        Some(records) => merged.combined.extend(records.iter().cloned()),
                        None => {
                            tracing::debug!(
                                request_id = %result.id,
                                field = %self.results_field,
                                "Successful response has no record array, ignoring"
                            );
                        }
                    }
                }
                FetchOutcome::Skipped { .. } => {}
                FetchOutcome::Failed(error) => merged.errors.push(ErrorRecord {
                    id: result.id.clone(),
                    kind: error.kind(),
                    error: error.to_string(),
                }),
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::FetchError;
    use serde_json::json;

    #[test]
    fn test_merges_pages_in_order() {
        let results = vec![
            FetchResult::success("page-1", 1, json!({ "results": [{ "v": 1 }, { "v": 2 }] })),
            FetchResult::skipped("page-2", 1, "not found"),
            FetchResult::success("page-3", 2, json!({ "results": [{ "v": 3 }], "next": null })),
        ];

        let merged = ResultAggregator::default().merge(&results);
        assert_eq!(merged.combined, vec![json!({"v": 1}), json!({"v": 2}), json!({"v": 3})]);
        assert!(merged.is_complete());
    }

    #[test]
    fn test_failures_become_error_records() {
        let results = vec![
            FetchResult::success("a", 1, json!({ "results": [1] })),
            FetchResult::failed(
                "b",
                3,
                FetchError::Network {
                    cause: "connection refused".to_string(),
                },
            ),
            FetchResult::misconfigured("c", "missing value for placeholder 'id'"),
        ];

        let merged = ResultAggregator::default().merge(&results);
        assert_eq!(merged.combined, vec![json!(1)]);
        assert_eq!(
            merged.errors,
            vec![
                ErrorRecord {
                    id: "b".to_string(),
                    kind: FailureKind::Transient,
                    error: "Network error: connection refused".to_string(),
                },
                ErrorRecord {
                    id: "c".to_string(),
                    kind: FailureKind::ConfigurationError,
                    error: "Configuration error: missing value for placeholder 'id'".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_payloads_without_record_array_are_ignored() {
        let results = vec![
            FetchResult::success("a", 1, json!({ "data": [1, 2] })),
            FetchResult::success("b", 1, json!({ "results": "not a list" })),
            FetchResult::success("c", 1, json!([1, 2])),
            FetchResult::success("d", 1, Value::Null),
        ];

        let merged = ResultAggregator::default().merge(&results);
        assert!(merged.combined.is_empty());
        assert!(merged.errors.is_empty());
    }

    #[test]
    fn test_custom_results_field() {
        let results = vec![FetchResult::success("a", 1, json!({ "items": ["x"], "results": ["y"] }))];

        let merged = ResultAggregator::new("items").merge(&results);
        assert_eq!(merged.combined, vec![json!("x")]);
    }

    #[test]
    fn test_serialized_shape() {
        let merged = AggregatedResults {
            combined: vec![json!({ "v": 1 })],
            errors: vec![ErrorRecord {
                id: "b".to_string(),
                kind: FailureKind::ServerError,
                error: "HTTP request returned error status code: 500 - oops".to_string(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!({
                "combined": [{ "v": 1 }],
                "errors": [{
                    "id": "b",
                    "kind": "server_error",
                    "error": "HTTP request returned error status code: 500 - oops"
                }]
            })
        );
    }
}
