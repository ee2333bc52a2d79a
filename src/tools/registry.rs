//! Tool registry - the catalog of tools exposed to the model
//!
//! Tool identity is the closed [`ToolKind`] enum; the registry is derived from
//! it at construction, so names are unique and specs never change afterwards.

use serde::Serialize;
use serde_json::{json, Value};

/// Smallest, default and largest `limit` accepted by the search tool
pub const SEARCH_LIMIT_MIN: usize = 1;
pub const SEARCH_LIMIT_DEFAULT: usize = 5;
pub const SEARCH_LIMIT_MAX: usize = 10;

/// Every tool the dispatcher knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Search,
    Transform,
    RunCode,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Search, ToolKind::Transform, ToolKind::RunCode];

    /// Name the model uses to call the tool
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Search => "search",
            ToolKind::Transform => "transform",
            ToolKind::RunCode => "run_code",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Declarative spec sent to the model
    pub fn spec(self) -> ToolSpec {
        match self {
            ToolKind::Search => ToolSpec {
                name: self.name().to_string(),
                description: "Search the web and return top snippet results.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Max results",
                            "default": SEARCH_LIMIT_DEFAULT,
                            "minimum": SEARCH_LIMIT_MIN,
                            "maximum": SEARCH_LIMIT_MAX
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolKind::Transform => ToolSpec {
                name: self.name().to_string(),
                description: "Run a text workflow (summarize, extract, outline, rewrite) over the \
                              provided data using the AI Pipe workflow or generation endpoint."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "workflow": {
                            "type": "string",
                            "description": "Workflow name (e.g., summarize, extract, outline, rewrite)"
                        },
                        "data": {
                            "type": "string",
                            "description": "Input text or JSON string"
                        }
                    },
                    "required": ["data"]
                }),
            },
            ToolKind::RunCode => ToolSpec {
                name: self.name().to_string(),
                description: "Run JavaScript in an isolated sandbox and return console logs + \
                              result. The code is a function body: use `return` for the result."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "description": "JavaScript code to execute"
                        }
                    },
                    "required": ["code"]
                }),
            },
        }
    }
}

/// A callable tool as described to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// OpenAI-compatible wrapper: `{"type":"function","function":{…}}`
#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSpec,
}

impl ToolSpec {
    /// Shape expected in the `tools` array of a chat request
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(WireTool {
            tool_type: "function",
            function: self,
        })
        .unwrap_or(Value::Null)
    }

    /// Names of the required parameters, in schema order
    pub fn required(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Immutable catalog built once at startup
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            specs: ToolKind::ALL.into_iter().map(ToolKind::spec).collect(),
        }
    }

    pub fn list(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
