//! Uniform result shape for every tool
//!
//! A [`ToolResult`] is folded back into the conversation as flat JSON text
//! and parsed back without loss. The enum is untagged, so the variants are
//! told apart by their required fields alone.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sandbox::ExecutionOutcome;

/// One search hit, regardless of which provider produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Payload of the `search` tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// "google-cse" for the keyed provider, "fallback" for the unkeyed chain
    pub provider: String,
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Payload of the `transform` tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOutput {
    pub workflow: String,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Full response body of the generation endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Result of one tool dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Search(SearchResults),
    Transform(TransformOutput),
    Execution(ExecutionOutcome),
    Failure { error: String },
}

impl ToolResult {
    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult::Failure {
            error: error.into(),
        }
    }

    /// True for dispatch failures and for executions that threw or timed out
    pub fn is_error(&self) -> bool {
        match self {
            ToolResult::Failure { .. } => true,
            ToolResult::Execution(outcome) => !outcome.is_success(),
            _ => false,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolResult::Failure { error } => Some(error),
            ToolResult::Execution(outcome) => outcome.error.as_deref(),
            _ => None,
        }
    }

    /// Flat JSON text for the `tool` turn
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("unserializable tool result: {}", e) }).to_string()
        })
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<SearchResults> for ToolResult {
    fn from(results: SearchResults) -> Self {
        ToolResult::Search(results)
    }
}

impl From<TransformOutput> for ToolResult {
    fn from(output: TransformOutput) -> Self {
        ToolResult::Transform(output)
    }
}

impl From<ExecutionOutcome> for ToolResult {
    fn from(outcome: ExecutionOutcome) -> Self {
        ToolResult::Execution(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LogEntry;
    use serde_json::json;

    #[test]
    fn test_failure_is_flat_error_object() {
        let text = ToolResult::failure("unknown tool: nope").to_text();
        assert_eq!(text, r#"{"error":"unknown tool: nope"}"#);
    }

    #[test]
    fn test_execution_with_error_is_not_mistaken_for_failure() {
        let outcome = ExecutionOutcome {
            logs: vec![LogEntry {
                level: "log".to_string(),
                args: vec![json!("x")],
            }],
            result: Value::Null,
            error: Some("ReferenceError: y is not defined".to_string()),
        };
        let result = ToolResult::Execution(outcome);
        let parsed = ToolResult::from_text(&result.to_text()).unwrap();
        assert_eq!(parsed, result);
        assert!(parsed.is_error());
    }

    #[test]
    fn test_transform_without_confidence_round_trips() {
        let result = ToolResult::Transform(TransformOutput {
            workflow: "summarize@aipipe".to_string(),
            output: json!("- a\n- b"),
            confidence: None,
            raw: Some(json!({"output_text": "- a\n- b"})),
        });
        let text = result.to_text();
        assert!(!text.contains("confidence"));
        assert_eq!(ToolResult::from_text(&text).unwrap(), result);
    }

    #[test]
    fn test_search_shape() {
        let result = ToolResult::Search(SearchResults {
            provider: "fallback".to_string(),
            query: "rust".to_string(),
            results: vec![],
        });
        let value: Value = serde_json::from_str(&result.to_text()).unwrap();
        assert_eq!(value, json!({"provider": "fallback", "query": "rust", "results": []}));
        assert!(!result.is_error());
    }

    #[test]
    fn test_floats_survive_text_round_trip() {
        let values = [1.0715660391465826e-75, 0.1 + 0.2, -2.2250738585072014e-308, 1.7976931348623157e308];
        for value in values {
            let result = ToolResult::Execution(ExecutionOutcome {
                logs: vec![LogEntry {
                    level: "log".to_string(),
                    args: vec![json!(value)],
                }],
                result: json!(value),
                error: None,
            });
            let parsed = ToolResult::from_text(&result.to_text()).unwrap();
            assert_eq!(parsed, result, "value {:e}", value);
        }
    }
}
