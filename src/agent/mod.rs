//! Agent module for the tool-calling conversation loop
//!
//! This module provides the loop that orchestrates:
//! - A model collaborator with tool calling (chat endpoint or offline stand-in)
//! - The tool dispatcher (search, transform, run_code)
//! - An append-only conversation log per session
//!
//! # Architecture
//!
//! ```text
//! User Input → Conversation.append(user) → AgentController
//!                  ↓
//!           ModelClient.complete(turns, tool specs, model)
//!                  ↓
//!           {text, tool calls} → Conversation.append(assistant)
//!                  ↓
//!           ToolDispatcher.dispatch(call) for each call, in order
//!                  ↓
//!           Conversation.append(tool result)
//!                  ↓
//!           Next model call → Loop or Done (bounded by max_cycles)
//! ```

pub mod controller;
pub mod conversation;

pub use controller::{AgentConfig, AgentController, AgentError, AgentEvent, LoopState, TurnResult};
pub use conversation::{Conversation, ConversationError};
