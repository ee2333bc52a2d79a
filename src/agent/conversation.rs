//! Conversation state for one agent session
//!
//! An append-only log of turns. The system turn is inserted once at
//! construction and stays at index 0; `append` is the only mutation and it
//! refuses turns that would break the log's invariants.

use serde::Serialize;

use crate::llm::tool_use::{last_user_content, turns_since_last_user};
use crate::llm::{Role, Turn, DEFAULT_AGENT_SYSTEM_PROMPT};

/// Error type for rejected appends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("the system turn is fixed when the conversation is created")]
    SystemTurnRejected,
    #[error("tool turn has no tool call id")]
    MissingToolCallId,
    #[error("tool turn answers unknown tool call '{0}'")]
    UnknownToolCallId(String),
}

/// A single conversation session
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    /// Unique session ID (UUID v7)
    id: String,
    turns: Vec<Turn>,
}

impl Conversation {
    /// Create a conversation headed by `system_prompt`
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Create a conversation with the built-in agent instructions
    pub fn with_default_prompt() -> Self {
        Self::new(DEFAULT_AGENT_SYSTEM_PROMPT)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a turn, leaving the log untouched on rejection
    pub fn append(&mut self, turn: Turn) -> Result<(), ConversationError> {
        match turn.role {
            Role::System => return Err(ConversationError::SystemTurnRejected),
            Role::Tool => {
                let id = turn
                    .tool_call_id
                    .as_deref()
                    .ok_or(ConversationError::MissingToolCallId)?;
                if !self.was_requested(id) {
                    return Err(ConversationError::UnknownToolCallId(id.to_string()));
                }
            }
            Role::User | Role::Assistant => {}
        }
        self.turns.push(turn);
        Ok(())
    }

    fn was_requested(&self, call_id: &str) -> bool {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .flat_map(|t| t.tool_calls.iter())
            .any(|call| call.id == call_id)
    }

    /// The full ordered log, system turn first
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_turn(&self) -> &Turn {
        &self.turns[0]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the system turn is present from construction
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_user_content(&self) -> Option<&str> {
        last_user_content(&self.turns)
    }

    pub fn turns_since_last_user(&self) -> &[Turn] {
        turns_since_last_user(&self.turns)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::with_default_prompt()
    }
}
