//! Envelope protocol spoken across the isolation boundary
//!
//! One JSON object per line:
//!
//! ```text
//! host  → guest   {"type":"run","id":"…","code":"…"}
//! guest → host    {"type":"result","id":"…","logs":[…],"result":…,"error":null}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One intercepted console call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// "log", "info", "warn", "error" or "debug"
    pub level: String,
    pub args: Vec<Value>,
}

/// What a single sandboxed run produced
///
/// `result` is `null` when the code returned nothing or threw; `error` holds
/// the thrown value (or a boundary fault such as a timeout) rendered as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub logs: Vec<LogEntry>,
    pub result: Value,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for a run that never produced guest output
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            logs: Vec::new(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A message crossing the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Host asks the guest to run a function body
    Run { id: String, code: String },
    /// Guest reports the outcome of the run with the same id
    #[serde(rename = "result")]
    Reply {
        id: String,
        logs: Vec<LogEntry>,
        result: Value,
        error: Option<String>,
    },
}

impl Envelope {
    pub fn reply(id: impl Into<String>, outcome: ExecutionOutcome) -> Self {
        Envelope::Reply {
            id: id.into(),
            logs: outcome.logs,
            result: outcome.result,
            error: outcome.error,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Envelope::Run { id, .. } | Envelope::Reply { id, .. } => id,
        }
    }

    /// Serialize to a single line (no trailing newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
