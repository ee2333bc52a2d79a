//! Deterministic local stand-in for the model
//!
//! Used when no model credential is configured so the loop still runs end to
//! end. It looks at the latest user turn with a few keyword rules and asks for
//! at most one tool; once tool results follow that user turn it answers with
//! a short digest of them instead of calling tools again.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::tool_use::{
    last_user_content, turns_since_last_user, ModelClient, ModelError, ModelResponse, Role,
    ToolCallRequest, Turn,
};
use crate::tools::{ToolKind, ToolSpec};

/// Snippet the stand-in asks the sandbox to run
pub const DEMO_SNIPPET: &str = "console.log('Hello from sandbox'); return 2+2;";

/// Reply when no rule matches
pub const IDLE_REPLY: &str = "OK. What's next?";

const DIGEST_CHARS: usize = 200;

lazy_static! {
    static ref WANTS_SEARCH: Regex =
        Regex::new(r"(?i)\b(search|latest|look\s*up|google)\b").expect("valid search regex");
    static ref WANTS_CODE: Regex =
        Regex::new(r"(?i)\b(run\s+code|execute|javascript|js)\b").expect("valid code regex");
    static ref WANTS_TRANSFORM: Regex =
        Regex::new(r"(?i)\b(summari[sz]e|pipeline|transform|ai\s*pipe)\b").expect("valid transform regex");
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}

/// Keyword-driven model that never touches the network
#[derive(Debug, Clone, Default)]
pub struct OfflineModel;

impl OfflineModel {
    pub fn new() -> Self {
        Self
    }

    /// Decide the next response for a transcript
    pub fn respond(&self, turns: &[Turn]) -> ModelResponse {
        let tool_turns: Vec<&Turn> = turns_since_last_user(turns)
            .iter()
            .filter(|t| t.role == Role::Tool)
            .collect();
        if !tool_turns.is_empty() {
            return digest(&tool_turns);
        }

        let input = last_user_content(turns).unwrap_or_default();
        // Position-derived ids keep the stand-in deterministic
        let call_id = format!("offline_{}", turns.len());

        if WANTS_SEARCH.is_match(input) {
            let args = json!({ "query": input, "limit": 5 });
            return ModelResponse {
                text: "Let me search that.".to_string(),
                tool_calls: vec![ToolCallRequest::new(call_id, ToolKind::Search.name(), args.to_string())],
            };
        }
        if WANTS_CODE.is_match(input) {
            let args = json!({ "code": DEMO_SNIPPET });
            return ModelResponse {
                text: "Executing JavaScript in the sandbox.".to_string(),
                tool_calls: vec![ToolCallRequest::new(call_id, ToolKind::RunCode.name(), args.to_string())],
            };
        }
        if WANTS_TRANSFORM.is_match(input) {
            let args = json!({ "workflow": "summarize", "data": input });
            return ModelResponse {
                text: "Running the summarize workflow.".to_string(),
                tool_calls: vec![ToolCallRequest::new(call_id, ToolKind::Transform.name(), args.to_string())],
            };
        }

        ModelResponse::text(IDLE_REPLY)
    }
}

fn digest(tool_turns: &[&Turn]) -> ModelResponse {
    let mut lines = vec!["Here is what the tools returned:".to_string()];
    for turn in tool_turns {
        let name = turn.tool_name.as_deref().unwrap_or("tool");
        lines.push(format!("- {}: {}", name, truncate(&turn.content, DIGEST_CHARS)));
    }
    ModelResponse::text(lines.join("\n"))
}

#[async_trait]
impl ModelClient for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(
        &self,
        turns: &[Turn],
        _tools: &[ToolSpec],
        _model: &str,
    ) -> Result<ModelResponse, ModelError> {
        Ok(self.respond(turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(input: &str) -> Vec<Turn> {
        vec![Turn::system("s"), Turn::user(input)]
    }

    #[test]
    fn test_search_rule() {
        let response = OfflineModel::new().respond(&transcript("Search the latest Rust release"));
        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert_eq!(call.name, "search");
        assert_eq!(call.id, "offline_2");
        let args: serde_json::Value = serde_json::from_str(&call.arguments_json).unwrap();
        assert_eq!(args["limit"], 5);
        assert_eq!(args["query"], "Search the latest Rust release");
    }

    #[test]
    fn test_code_rule() {
        let response = OfflineModel::new().respond(&transcript("please run code for me"));
        assert_eq!(response.tool_calls[0].name, "run_code");
        assert!(response.tool_calls[0].arguments_json.contains("Hello from sandbox"));
    }

    #[test]
    fn test_transform_rule() {
        let response = OfflineModel::new().respond(&transcript("Summarize this paragraph"));
        assert_eq!(response.tool_calls[0].name, "transform");
    }

    #[test]
    fn test_idle_reply() {
        let response = OfflineModel::new().respond(&transcript("hello there"));
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.text, IDLE_REPLY);
    }

    #[test]
    fn test_json_does_not_trigger_code_rule() {
        let response = OfflineModel::new().respond(&transcript("is json a format?"));
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn test_digest_after_tool_results() {
        let mut turns = transcript("search rust");
        turns.push(Turn::assistant(
            "Let me search that.",
            vec![ToolCallRequest::new("offline_2", "search", "{}")],
        ));
        turns.push(Turn::tool("offline_2", "search", r#"{"provider":"fallback","query":"search rust","results":[]}"#));

        let response = OfflineModel::new().respond(&turns);
        assert!(response.tool_calls.is_empty());
        assert!(response.text.starts_with("Here is what the tools returned:"));
        assert!(response.text.contains("- search: "));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
