//! Tool dispatcher - routes a model's tool call to its handler
//!
//! `dispatch` is total: malformed arguments, unknown tools and collaborator
//! failures all come back as a [`ToolResult`] rather than an error.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::registry::ToolKind;
use super::result::ToolResult;
use super::search::{clamp_limit, SearchChain};
use super::transform::TransformPipeline;
use crate::config::Credentials;
use crate::llm::ToolCallRequest;
use crate::metrics::TOOL_CALLS;
use crate::sandbox::SandboxExecutor;

/// Timeout for every outbound provider request
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransformArgs {
    #[serde(default)]
    workflow: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct RunCodeArgs {
    code: String,
}

/// Parse the raw argument string; blank means no arguments
fn parse_arguments(raw: &str) -> Option<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Some(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn decode<T: serde::de::DeserializeOwned>(args: Map<String, Value>) -> Result<T, ToolResult> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolResult::failure(format!("invalid arguments: {}", e)))
}

/// Shared HTTP client for the search and transform collaborators
pub fn provider_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("pipeagent/", env!("CARGO_PKG_VERSION")))
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Maps tool calls onto the search chain, transform pipeline and sandbox
pub struct ToolDispatcher {
    search: SearchChain,
    transform: TransformPipeline,
    sandbox: SandboxExecutor,
}

impl ToolDispatcher {
    pub fn new(search: SearchChain, transform: TransformPipeline, sandbox: SandboxExecutor) -> Self {
        Self {
            search,
            transform,
            sandbox,
        }
    }

    /// Wire up the real collaborators for the configured credentials
    pub fn from_credentials(credentials: &Credentials, model: &str, sandbox: SandboxExecutor) -> Self {
        let client = provider_client();
        Self::new(
            SearchChain::from_credentials(credentials, client.clone()),
            TransformPipeline::from_credentials(credentials, model, client),
            sandbox,
        )
    }

    pub fn search_chain(&self) -> &SearchChain {
        &self.search
    }

    pub fn transform_pipeline(&self) -> &TransformPipeline {
        &self.transform
    }

    /// Run one tool call to completion
    pub async fn dispatch(&self, request: &ToolCallRequest) -> ToolResult {
        self.dispatch_with_warnings(request).await.0
    }

    /// Run one tool call, also returning the collaborator failures that were
    /// absorbed on the way to the result (a failed search provider, a
    /// transform tier that fell through)
    pub async fn dispatch_with_warnings(&self, request: &ToolCallRequest) -> (ToolResult, Vec<String>) {
        let start = Instant::now();
        info!(tool = %request.name, call_id = %request.id, "Dispatching tool call");

        let (result, warnings) = self.route(request).await;

        let outcome = if result.is_error() { "error" } else { "ok" };
        let label = ToolKind::from_name(&request.name)
            .map(ToolKind::name)
            .unwrap_or("unknown");
        TOOL_CALLS.with_label_values(&[label, outcome]).inc();
        debug!(
            tool = %request.name,
            call_id = %request.id,
            outcome,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            warnings = warnings.len(),
            "Tool call finished"
        );

        (result, warnings)
    }

    async fn route(&self, request: &ToolCallRequest) -> (ToolResult, Vec<String>) {
        let Some(args) = parse_arguments(&request.arguments_json) else {
            return (ToolResult::failure("invalid arguments"), Vec::new());
        };

        let Some(kind) = ToolKind::from_name(&request.name) else {
            return (ToolResult::failure(format!("unknown tool: {}", request.name)), Vec::new());
        };

        match kind {
            ToolKind::Search => match decode::<SearchArgs>(args) {
                Ok(args) => {
                    let limit = clamp_limit(args.limit.as_ref());
                    let (results, warnings) = self.search.run_with_warnings(&args.query, limit).await;
                    (results.into(), warnings)
                }
                Err(failure) => (failure, Vec::new()),
            },
            ToolKind::Transform => match decode::<TransformArgs>(args) {
                Ok(args) => {
                    let (output, warnings) = self
                        .transform
                        .run_with_warnings(args.workflow.as_deref(), &args.data)
                        .await;
                    (output.into(), warnings)
                }
                Err(failure) => (failure, Vec::new()),
            },
            ToolKind::RunCode => match decode::<RunCodeArgs>(args) {
                Ok(args) => (self.sandbox.execute(&args.code).await.into(), Vec::new()),
                Err(failure) => (failure, Vec::new()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_arguments_are_empty_object() {
        assert_eq!(parse_arguments(""), Some(Map::new()));
        assert_eq!(parse_arguments("  \n"), Some(Map::new()));
    }

    #[test]
    fn test_non_object_arguments_are_rejected() {
        assert!(parse_arguments("[1,2]").is_none());
        assert!(parse_arguments("\"query\"").is_none());
        assert!(parse_arguments("{not json").is_none());
    }

    #[test]
    fn test_decode_reports_missing_field() {
        let failure = decode::<RunCodeArgs>(Map::new()).unwrap_err();
        let message = failure.error_message().unwrap();
        assert!(message.starts_with("invalid arguments: "));
        assert!(message.contains("code"));
    }
}
