//! Conversation turns and the model collaborator contract
//!
//! A model receives the full ordered transcript plus the tool specs and
//! answers with text, tool calls, or both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolSpec;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON text exactly as the model produced it
    pub arguments_json: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments_json: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on `tool` turns: the request this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Set on `assistant` turns that asked for tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Turn {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Index just past the latest `user` turn (0 when there is none)
fn after_last_user(turns: &[Turn]) -> usize {
    turns
        .iter()
        .rposition(|t| t.role == Role::User)
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Content of the latest `user` turn
pub fn last_user_content(turns: &[Turn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
}

/// Every turn appended after the latest `user` turn
pub fn turns_since_last_user(turns: &[Turn]) -> &[Turn] {
    &turns[after_last_user(turns)..]
}

/// What a model call produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// Error type for model calls
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("empty response from model endpoint")]
    EmptyResponse,
}

/// The language-model collaborator
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        model: &str,
    ) -> Result<ModelResponse, ModelError>;
}

/// System instruction placed at the head of every conversation
pub const DEFAULT_AGENT_SYSTEM_PROMPT: &str = r#"You are a tool-using agent. Keep responses brief and useful.
If user intent is ambiguous or multi-goal, propose a brief plan (numbered steps) and ask one high-leverage clarifying question if essential.
Prefer official/primary sources and state explicit dates when queries imply recency ('latest', 'today').
Cross-check at least two reputable sources when facts conflict; present the disagreement and a short confidence note.
Use multi-tool chains when helpful (search → transform → run_code) and state the plan briefly.
When using search results, cite links inline; if unknown, say 'not found' and do not fabricate.
For non-trivial calculations, use run_code to verify; show the formula and the computed value.
For very long inputs, chunk logically and summarize per chunk before a final synthesis.
Carry forward key facts from tool results as brief 'Notes:' (keep them short).
If a source is paywalled or unreachable, say so and seek alternative reputable sources; never invent hidden content.
Translate relative dates into explicit dates when possible; if unsure, ask for locale/timeframe.
Decline unsafe or illegal requests and suggest safe, high-level alternatives.
On empty or failed search, retry once with a refined query (keywords, site filters). If still empty, say so and propose next steps.
Honor explicit output formats (JSON/table). Validate JSON and keep it minimal.
Be concise; prefer few tool calls; ask before heavy operations.
If the user forbids tools, comply; answer text-only and note limitations/uncertainty."#;
