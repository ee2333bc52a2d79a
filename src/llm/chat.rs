//! OpenAI-compatible chat completions client with tool calling
//!
//! Talks to `POST {base}/chat/completions` (AI Pipe by default) with the
//! registry's tools and `tool_choice: "auto"`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::tool_use::{ModelClient, ModelError, ModelResponse, Role, ToolCallRequest, Turn};
use crate::tools::ToolSpec;

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// Normally a JSON string; some servers send the object itself
    #[serde(default)]
    arguments: Value,
}

/// Render one turn as a chat `messages` entry
pub fn to_wire_message(turn: &Turn) -> Value {
    let mut message = json!({
        "role": turn.role.as_str(),
        "content": turn.content,
    });
    match turn.role {
        Role::Assistant if !turn.tool_calls.is_empty() => {
            message["tool_calls"] = turn
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments_json,
                        }
                    })
                })
                .collect();
        }
        Role::Tool => {
            if let Some(id) = &turn.tool_call_id {
                message["tool_call_id"] = json!(id);
            }
            if let Some(name) = &turn.tool_name {
                message["name"] = json!(name);
            }
        }
        _ => {}
    }
    message
}

/// Parse a completion body; a missing choice is an empty answer
pub fn parse_completion(text: &str) -> Result<ModelResponse, ModelError> {
    let body: CompletionBody = serde_json::from_str(text)?;
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .unwrap_or_default();

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments_json = match call.function.arguments {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            ToolCallRequest::new(call.id.unwrap_or_default(), call.function.name, arguments_json)
        })
        .collect();

    Ok(ModelResponse {
        text: message.content.unwrap_or_default(),
        tool_calls,
    })
}

/// Client for an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct ChatClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `endpoint` - Full chat completions URL
    /// * `token` - Bearer token
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    fn name(&self) -> &str {
        "chat"
    }

    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        model: &str,
    ) -> Result<ModelResponse, ModelError> {
        let body = json!({
            "model": model,
            "messages": turns.iter().map(to_wire_message).collect::<Vec<_>>(),
            "tools": tools.iter().map(ToolSpec::to_wire).collect::<Vec<_>>(),
            "tool_choice": "auto",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        parse_completion(&text)
    }
}
