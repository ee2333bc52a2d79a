//! Agent Controller - the turn loop between the model and the tools
//!
//! Each user input drives an explicit state machine:
//!
//! ```text
//! AwaitingUser → ModelCall → ToolDispatch → ModelCall → … → DoneForTurn
//! ```
//!
//! A cycle is one model call. The loop stops with
//! [`AgentError::CycleLimitExceeded`] rather than start cycle `max_cycles + 1`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::conversation::{Conversation, ConversationError};
use crate::config::DEFAULT_MODEL;
use crate::llm::{ModelClient, ModelResponse, ToolCallRequest, Turn};
use crate::metrics::{AGENT_CYCLES, AGENT_TURNS, MODEL_CALL_DURATION};
use crate::tools::{ToolDispatcher, ToolRegistry, ToolResult};

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier passed to the model collaborator
    pub model: String,
    /// Maximum number of model calls per user turn
    pub max_cycles: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_cycles: 10,
        }
    }
}

/// Something the caller should see while a turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Non-empty assistant text
    AssistantText(String),
    /// A tool call about to be dispatched
    ToolCall(ToolCallRequest),
    /// The result of a dispatched tool call
    ToolResult {
        call_id: String,
        name: String,
        result: ToolResult,
    },
    /// A recoverable problem: an unreachable model endpoint, a failed search
    /// provider or a transform tier that fell through
    Warning(String),
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Latest non-empty assistant text of the turn (empty if there was none)
    pub final_response: String,
    /// Number of model calls made
    pub cycles: usize,
    /// Number of tool calls dispatched
    pub tool_calls_made: usize,
    /// Unique trace ID for this turn
    pub trace_id: String,
}

/// Error type for agent turns
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("cycle limit exceeded: stopped after {limit} model calls")]
    CycleLimitExceeded { limit: usize },
    #[error("conversation invariant violated: {0}")]
    Conversation(#[from] ConversationError),
}

/// Where the loop is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUser,
    ModelCall,
    ToolDispatch,
    DoneForTurn,
}

/// Agent Controller orchestrating the model and the tools
pub struct AgentController {
    model: Arc<dyn ModelClient>,
    dispatcher: ToolDispatcher,
    registry: ToolRegistry,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `model` - Model collaborator (chat endpoint or offline stand-in)
    /// * `dispatcher` - Routes tool calls to search, transform and the sandbox
    /// * `config` - Agent configuration
    pub fn new(model: Arc<dyn ModelClient>, dispatcher: ToolDispatcher, config: AgentConfig) -> Self {
        Self {
            model,
            dispatcher,
            registry: ToolRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run one user turn to completion
    ///
    /// `on_event` sees assistant text, tool calls, tool results and warnings
    /// as they happen.
    ///
    /// # Returns
    /// TurnResult once the model stops asking for tools, or
    /// `CycleLimitExceeded` after `max_cycles` model calls
    pub async fn run_turn<F>(
        &self,
        conversation: &mut Conversation,
        input: &str,
        mut on_event: F,
    ) -> Result<TurnResult, AgentError>
    where
        F: FnMut(&AgentEvent),
    {
        let trace_id = Uuid::now_v7().to_string();

        // Root span for the whole turn
        let turn_span = info_span!(
            "agent_turn",
            trace_id = %trace_id,
            session_id = %conversation.id(),
            model = %self.config.model,
            otel.name = "agent_turn"
        );

        async {
            info!(trace_id = %trace_id, input_len = input.len(), "Starting agent turn");

            let mut state = LoopState::AwaitingUser;
            let mut cycles = 0;
            let mut tool_calls_made = 0;
            let mut final_response = String::new();
            let mut pending: Vec<ToolCallRequest> = Vec::new();

            loop {
                match state {
                    LoopState::AwaitingUser => {
                        conversation.append(Turn::user(input))?;
                        state = LoopState::ModelCall;
                    }

                    LoopState::ModelCall => {
                        if cycles >= self.config.max_cycles {
                            warn!(trace_id = %trace_id, cycles, "Cycle limit reached");
                            AGENT_TURNS.with_label_values(&["cycle_limit"]).inc();
                            AGENT_CYCLES.observe(cycles as f64);
                            return Err(AgentError::CycleLimitExceeded {
                                limit: self.config.max_cycles,
                            });
                        }
                        cycles += 1;

                        let response = self
                            .call_model(conversation.snapshot(), cycles, &trace_id, &mut on_event)
                            .await;

                        let calls: Vec<ToolCallRequest> =
                            response.tool_calls.into_iter().map(with_call_id).collect();
                        let has_text = !response.text.trim().is_empty();

                        if has_text || !calls.is_empty() {
                            conversation.append(Turn::assistant(response.text.clone(), calls.clone()))?;
                        }
                        if has_text {
                            final_response = response.text.clone();
                            on_event(&AgentEvent::AssistantText(response.text));
                        }

                        if calls.is_empty() {
                            state = LoopState::DoneForTurn;
                        } else {
                            pending = calls;
                            state = LoopState::ToolDispatch;
                        }
                    }

                    LoopState::ToolDispatch => {
                        // Sequential, in the order the model emitted them
                        for request in pending.drain(..) {
                            on_event(&AgentEvent::ToolCall(request.clone()));
                            tool_calls_made += 1;

                            let tool_span = info_span!(
                                "tool_dispatch",
                                trace_id = %trace_id,
                                tool = %request.name,
                                call_id = %request.id,
                                otel.name = "tool_dispatch"
                            );
                            let (result, warnings) = self
                                .dispatcher
                                .dispatch_with_warnings(&request)
                                .instrument(tool_span)
                                .await;
                            for warning in warnings {
                                on_event(&AgentEvent::Warning(warning));
                            }

                            if let Some(error) = result.error_message() {
                                debug!(trace_id = %trace_id, tool = %request.name, error, "Tool returned an error");
                            }

                            conversation.append(Turn::tool(
                                request.id.clone(),
                                request.name.clone(),
                                result.to_text(),
                            ))?;
                            on_event(&AgentEvent::ToolResult {
                                call_id: request.id,
                                name: request.name,
                                result,
                            });
                        }
                        state = LoopState::ModelCall;
                    }

                    LoopState::DoneForTurn => {
                        info!(trace_id = %trace_id, cycles, tool_calls = tool_calls_made, "Agent turn completed");
                        AGENT_TURNS.with_label_values(&["success"]).inc();
                        AGENT_CYCLES.observe(cycles as f64);

                        return Ok(TurnResult {
                            final_response,
                            cycles,
                            tool_calls_made,
                            trace_id: trace_id.clone(),
                        });
                    }
                }
            }
        }
        .instrument(turn_span)
        .await
    }

    /// One model call; transport failures become a warning and an empty response
    async fn call_model<F>(
        &self,
        turns: &[Turn],
        cycle: usize,
        trace_id: &str,
        on_event: &mut F,
    ) -> ModelResponse
    where
        F: FnMut(&AgentEvent),
    {
        let model_span = info_span!(
            "model_call",
            trace_id = %trace_id,
            cycle,
            model = %self.config.model,
            client = self.model.name(),
            otel.name = "model_call"
        );

        let start = Instant::now();
        let result = self
            .model
            .complete(turns, self.registry.list(), &self.config.model)
            .instrument(model_span)
            .await;
        let elapsed = start.elapsed();

        MODEL_CALL_DURATION
            .with_label_values(&[&self.config.model])
            .observe(elapsed.as_secs_f64());

        match result {
            Ok(response) => {
                debug!(
                    trace_id = %trace_id,
                    cycle,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    tool_calls = response.tool_calls.len(),
                    "Model call completed"
                );
                response
            }
            Err(e) => {
                warn!(trace_id = %trace_id, cycle, error = %e, "Model call failed");
                on_event(&AgentEvent::Warning(format!("model call failed: {}", e)));
                ModelResponse::default()
            }
        }
    }
}

/// Give an id to tool calls that arrived without one
fn with_call_id(mut request: ToolCallRequest) -> ToolCallRequest {
    if request.id.trim().is_empty() {
        request.id = format!("call_{}", Uuid::now_v7().simple());
    }
    request
}
