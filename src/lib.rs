//! pipeagent - tool-calling agent loop with sandboxed code execution
//!
//! The agent mediates between a language-model endpoint and three tools
//! (web search, a text-transform pipeline and sandboxed JavaScript), feeding
//! tool results back to the model until it produces a final answer.
//!
//! # Modules
//!
//! - `agent` - the turn loop and the per-session conversation log
//! - `llm` - model collaborators (OpenAI-compatible chat, offline stand-in)
//! - `tools` - registry, dispatcher, search chain and transform tiers
//! - `sandbox` - isolated JavaScript executor and its envelope protocol
//! - `config` - credentials and sandbox settings
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - log and OpenTelemetry setup
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pipeagent::{AgentConfig, AgentController, Conversation, Credentials, OfflineModel,
//!                 SandboxConfig, SandboxExecutor, ToolDispatcher};
//!
//! let sandbox = SandboxExecutor::spawn(&SandboxConfig::default())?;
//! let dispatcher = ToolDispatcher::from_credentials(&Credentials::default(), "gpt-4.1-nano", sandbox);
//! let agent = AgentController::new(Arc::new(OfflineModel::new()), dispatcher, AgentConfig::default());
//!
//! let mut conversation = Conversation::with_default_prompt();
//! let result = agent.run_turn(&mut conversation, "run code", |event| println!("{:?}", event)).await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod sandbox;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, AgentError, AgentEvent, Conversation, TurnResult};
pub use config::{Credentials, SandboxBackend, SandboxConfig};
pub use llm::{ChatClient, ModelClient, OfflineModel, ToolCallRequest, Turn};
pub use sandbox::{ExecutionOutcome, SandboxExecutor};
pub use tools::{ToolDispatcher, ToolRegistry, ToolResult};
