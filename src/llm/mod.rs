//! Model collaborators for the agent loop
//!
//! - `tool_use` - turns, tool-call requests and the `ModelClient` trait
//! - `chat` - OpenAI-compatible chat completions client (AI Pipe)
//! - `offline` - deterministic keyword stand-in used without credentials

pub mod chat;
pub mod offline;
pub mod tool_use;

pub use chat::ChatClient;
pub use offline::OfflineModel;
pub use tool_use::{
    ModelClient, ModelError, ModelResponse, Role, ToolCallRequest, Turn,
    DEFAULT_AGENT_SYSTEM_PROMPT,
};
