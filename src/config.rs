//! Runtime configuration for the agent's collaborators
//!
//! Everything here is in-memory; the `pipeagent` binary fills these structs
//! from command-line flags and environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Base URL of the OpenAI-compatible AI Pipe proxy
pub const DEFAULT_AIPIPE_BASE_URL: &str = "https://aipipe.org/openai/v1";

/// Credentials and endpoints for the network collaborators
///
/// A blank value counts as absent; call [`Credentials::normalized`] after
/// filling the struct from user input.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token for the chat and generation endpoints
    pub model_token: Option<String>,
    /// Base URL of the OpenAI-compatible endpoints
    pub base_url: String,
    /// Custom transform workflow endpoint (POST `{workflow, data}`)
    pub workflow_url: Option<String>,
    /// Google Custom Search engine id (`cx`)
    pub google_cse_id: Option<String>,
    /// Google Custom Search API key
    pub google_api_key: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            model_token: None,
            base_url: DEFAULT_AIPIPE_BASE_URL.to_string(),
            workflow_url: None,
            google_cse_id: None,
            google_api_key: None,
        }
    }
}

impl Credentials {
    /// Trim every value and drop the blank ones
    pub fn normalized(self) -> Self {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        Self {
            model_token: non_blank(self.model_token),
            base_url: if base_url.is_empty() {
                DEFAULT_AIPIPE_BASE_URL.to_string()
            } else {
                base_url
            },
            workflow_url: non_blank(self.workflow_url),
            google_cse_id: non_blank(self.google_cse_id),
            google_api_key: non_blank(self.google_api_key),
        }
    }

    /// Google CSE `(api_key, cse_id)` when both halves are configured
    pub fn google_cse(&self) -> Option<(&str, &str)> {
        match (&self.google_api_key, &self.google_cse_id) {
            (Some(key), Some(cx)) => Some((key.as_str(), cx.as_str())),
            _ => None,
        }
    }

    /// `{base}/chat/completions`
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// `{base}/responses`
    pub fn generation_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Which isolation boundary the sandbox executor talks across
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    /// Dedicated OS thread hosting the interpreter
    Thread,
    /// `sandbox_guest` child process over stdin/stdout
    Process,
}

impl FromStr for SandboxBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(SandboxBackend::Thread),
            "process" => Ok(SandboxBackend::Process),
            other => Err(format!(
                "unknown sandbox backend '{}' (expected 'thread' or 'process')",
                other
            )),
        }
    }
}

/// Configuration for the sandbox executor
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,
    /// Upper bound on a single `execute` call
    pub timeout_ms: u64,
    /// Iterations allowed per loop before the guest aborts the script
    pub loop_iteration_limit: u64,
    /// Maximum call depth inside the guest interpreter
    pub recursion_limit: usize,
    /// Path of the `sandbox_guest` binary (process backend only).
    /// Defaults to a sibling of the current executable.
    pub guest_path: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Process,
            timeout_ms: 5000,
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
            guest_path: None,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credentials_are_absent() {
        let creds = Credentials {
            model_token: Some("   ".to_string()),
            base_url: "https://proxy.example/v1/".to_string(),
            workflow_url: Some(String::new()),
            google_cse_id: Some(" cx ".to_string()),
            google_api_key: None,
        }
        .normalized();

        assert!(creds.model_token.is_none());
        assert!(creds.workflow_url.is_none());
        assert_eq!(creds.google_cse_id.as_deref(), Some("cx"));
        assert!(creds.google_cse().is_none());
        assert_eq!(creds.chat_url(), "https://proxy.example/v1/chat/completions");
        assert_eq!(creds.generation_url(), "https://proxy.example/v1/responses");
    }

    #[test]
    fn test_default_credentials_point_at_aipipe() {
        let creds = Credentials::default();
        assert_eq!(creds.generation_url(), "https://aipipe.org/openai/v1/responses");
        assert!(creds.model_token.is_none());
    }

    #[test]
    fn test_sandbox_backend_parsing() {
        assert_eq!("thread".parse::<SandboxBackend>(), Ok(SandboxBackend::Thread));
        assert_eq!("Process".parse::<SandboxBackend>(), Ok(SandboxBackend::Process));
        assert!("vm".parse::<SandboxBackend>().is_err());
    }

    #[test]
    fn test_sandbox_config_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.backend, SandboxBackend::Process);
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert!(config.guest_path.is_none());
    }
}
