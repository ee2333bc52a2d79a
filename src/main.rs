//! pipeagent - interactive agent REPL
//!
//! Reads one user message per line from stdin and runs it through the agent
//! loop, printing assistant text, tool calls and tool results as they happen.
//!
//! Commands: `/metrics` prints Prometheus metrics, `/quit` exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use pipeagent::agent::{AgentConfig, AgentController, AgentError, AgentEvent, Conversation};
use pipeagent::config::{
    Credentials, SandboxBackend, SandboxConfig, DEFAULT_AIPIPE_BASE_URL, DEFAULT_MODEL,
};
use pipeagent::llm::{ChatClient, ModelClient, OfflineModel};
use pipeagent::sandbox::SandboxExecutor;
use pipeagent::tools::ToolDispatcher;
use pipeagent::tracing::{init_tracing, shutdown_tracing};

/// Tool-calling agent with web search, text transforms and sandboxed JavaScript
#[derive(Debug, Parser)]
#[command(name = "pipeagent", version, about)]
struct Args {
    /// Model identifier sent to the chat endpoint
    #[arg(long, env = "PIPEAGENT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Bearer token for AI Pipe; without it the offline stand-in answers
    #[arg(long, env = "AIPIPE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Base URL of the OpenAI-compatible endpoints
    #[arg(long, env = "AIPIPE_BASE_URL", default_value = DEFAULT_AIPIPE_BASE_URL)]
    base_url: String,

    /// Custom transform workflow endpoint
    #[arg(long, env = "AIPIPE_WORKFLOW_URL")]
    workflow_url: Option<String>,

    /// Google Custom Search engine id
    #[arg(long, env = "GOOGLE_CSE_ID")]
    google_cse_id: Option<String>,

    /// Google Custom Search API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Maximum model calls per user turn
    #[arg(long, env = "PIPEAGENT_MAX_CYCLES", default_value_t = 10)]
    max_cycles: usize,

    /// Timeout for one sandboxed execution, in milliseconds
    #[arg(long, env = "PIPEAGENT_SANDBOX_TIMEOUT_MS", default_value_t = 5000)]
    sandbox_timeout_ms: u64,

    /// Sandbox backend: thread or process
    #[arg(long, env = "PIPEAGENT_SANDBOX", default_value = "process")]
    sandbox: SandboxBackend,

    /// Path of the sandbox_guest binary for the process backend
    #[arg(long, env = "PIPEAGENT_SANDBOX_GUEST")]
    sandbox_guest: Option<PathBuf>,

    /// OTLP collector endpoint; traces are exported only when set
    #[arg(long, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::AssistantText(text) => println!("[AGENT] {}", text),
        AgentEvent::ToolCall(call) => {
            println!("[TOOL] → {} ({}) {}", call.name, call.id, call.arguments_json)
        }
        AgentEvent::ToolResult { name, result, .. } => {
            let marker = if result.is_error() { "❌" } else { "✅" };
            println!("[TOOL] {} {} {}", marker, name, result.to_text());
        }
        AgentEvent::Warning(message) => println!("[WARN] {}", message),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    init_tracing("pipeagent", args.otlp_endpoint.as_deref())?;

    let credentials = Credentials {
        model_token: args.token,
        base_url: args.base_url,
        workflow_url: args.workflow_url,
        google_cse_id: args.google_cse_id,
        google_api_key: args.google_api_key,
    }
    .normalized();

    let sandbox = SandboxExecutor::spawn(&SandboxConfig {
        backend: args.sandbox,
        timeout_ms: args.sandbox_timeout_ms,
        guest_path: args.sandbox_guest,
        ..SandboxConfig::default()
    })?;

    let model: Arc<dyn ModelClient> = match &credentials.model_token {
        Some(token) => Arc::new(ChatClient::new(credentials.chat_url(), token.clone())),
        None => {
            println!("[AGENT] No AIPIPE_TOKEN set; using the offline stand-in model");
            Arc::new(OfflineModel::new())
        }
    };

    let dispatcher = ToolDispatcher::from_credentials(&credentials, &args.model, sandbox);
    println!(
        "[AGENT] Search providers: {}",
        dispatcher.search_chain().provider_order().join(" → ")
    );
    println!(
        "[AGENT] Transform tiers: {}",
        dispatcher.transform_pipeline().tier_names().join(" → ")
    );

    let controller = AgentController::new(
        model,
        dispatcher,
        AgentConfig {
            model: args.model,
            max_cycles: args.max_cycles,
        },
    );
    let mut conversation = Conversation::with_default_prompt();
    println!("[AGENT] Session {} ready. /metrics for metrics, /quit to exit.", conversation.id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/metrics" => {
                print!("{}", pipeagent::metrics::encode_text());
                continue;
            }
            _ => {}
        }

        match controller.run_turn(&mut conversation, input, print_event).await {
            Ok(result) => {
                if result.final_response.is_empty() {
                    println!("[AGENT] (no response)");
                }
                tracing::debug!(
                    trace_id = %result.trace_id,
                    cycles = result.cycles,
                    tool_calls = result.tool_calls_made,
                    "Turn finished"
                );
            }
            Err(AgentError::CycleLimitExceeded { limit }) => {
                println!("[AGENT] Stopped after {} model calls without a final answer", limit);
            }
            Err(e) => eprintln!("[AGENT] Error: {}", e),
        }
    }

    if args.otlp_endpoint.is_some() {
        shutdown_tracing();
    }
    Ok(())
}
