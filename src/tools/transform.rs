//! Text transforms behind the `transform` tool
//!
//! Tiers are tried in order and each failure falls through to the next:
//! the custom workflow endpoint, then the keyed generation endpoint, then a
//! deterministic local preview that cannot fail.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::ProviderError;
use super::result::TransformOutput;
use crate::config::Credentials;

/// Workflow used when the caller names none
pub const DEFAULT_WORKFLOW: &str = "summarize";

/// Data longer than this is cut down for the local preview
pub const PREVIEW_MAX_CHARS: usize = 160;
const PREVIEW_KEEP_CHARS: usize = 157;

/// Confidence reported by the local preview
pub const PREVIEW_CONFIDENCE: f64 = 0.42;

/// One way of producing a transform
#[derive(Debug, Clone, PartialEq)]
pub enum TransformTier {
    /// Custom workflow endpoint: POST `{workflow, data}`
    Workflow { url: String },
    /// OpenAI Responses-style generation endpoint with a bearer token
    Generation {
        url: String,
        token: String,
        model: String,
    },
    /// Truncating preview, always available
    Preview,
}

impl TransformTier {
    pub fn name(&self) -> &'static str {
        match self {
            TransformTier::Workflow { .. } => "workflow",
            TransformTier::Generation { .. } => "generation",
            TransformTier::Preview => "preview",
        }
    }
}

/// Instruction prompt sent to the generation endpoint
pub fn build_transform_prompt(workflow: &str, data: &str) -> String {
    format!(
        r#"You are an expert text transformer that operates strictly on the PROVIDED_INPUT.
Task: {workflow}  (if unclear, treat as 'outline' or 'summarize' as appropriate)
Rules:
1) Be brief by default (≤120 words) unless asked otherwise.
2) Use only facts in PROVIDED_INPUT. If something is missing, write: "not in input".
3) Preserve numbers, units, names, quotes; do not alter quantities.
4) If summarizing: produce 3–5 bullets covering What/Why/How/Numbers.
5) If extracting: return VALID JSON with only keys you actually found.
6) If rewriting/translating: preserve meaning & entities; note uncertainties.
7) If input is long, first create short section-wise bullets, then a final synthesis.
8) Append one line at end: Summary: <very short gist>.

PROVIDED_INPUT:
<<<
{data}
>>>

Return only the final output (no preface)."#
    )
}

/// `output[0].content[0].text`, else `output_text`, else the whole body
pub fn extract_generation_text(body: &Value) -> String {
    body.pointer("/output/0/content/0/text")
        .and_then(Value::as_str)
        .or_else(|| body.get("output_text").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Local preview: long data is cut to 157 characters plus `...`
pub fn preview(workflow: &str, data: &str) -> TransformOutput {
    let output = if data.chars().count() > PREVIEW_MAX_CHARS {
        let mut cut: String = data.chars().take(PREVIEW_KEEP_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        data.to_string()
    };
    TransformOutput {
        workflow: workflow.to_string(),
        output: Value::String(output),
        confidence: Some(PREVIEW_CONFIDENCE),
        raw: None,
    }
}

/// Ordered transform tiers sharing one HTTP client
pub struct TransformPipeline {
    client: reqwest::Client,
    tiers: Vec<TransformTier>,
}

impl TransformPipeline {
    /// The preview tier is appended when missing so `run` stays total
    pub fn new(client: reqwest::Client, mut tiers: Vec<TransformTier>) -> Self {
        if !tiers.contains(&TransformTier::Preview) {
            tiers.push(TransformTier::Preview);
        }
        Self { client, tiers }
    }

    /// Workflow endpoint and generation tiers as far as credentials allow
    pub fn from_credentials(credentials: &Credentials, model: &str, client: reqwest::Client) -> Self {
        let mut tiers = Vec::new();
        if let Some(url) = &credentials.workflow_url {
            tiers.push(TransformTier::Workflow { url: url.clone() });
        }
        if let Some(token) = &credentials.model_token {
            tiers.push(TransformTier::Generation {
                url: credentials.generation_url(),
                token: token.clone(),
                model: model.to_string(),
            });
        }
        Self::new(client, tiers)
    }

    /// Tier names in the order they are tried
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(TransformTier::name).collect()
    }

    /// Run `workflow` (default "summarize") over `data`. Never fails.
    pub async fn run(&self, workflow: Option<&str>, data: &str) -> TransformOutput {
        self.run_with_warnings(workflow, data).await.0
    }

    /// Like [`run`](Self::run), also returning one message per tier that
    /// failed before the answering one
    pub async fn run_with_warnings(&self, workflow: Option<&str>, data: &str) -> (TransformOutput, Vec<String>) {
        let mut warnings = Vec::new();
        let workflow = workflow
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .unwrap_or(DEFAULT_WORKFLOW);

        for tier in &self.tiers {
            let attempt = match tier {
                TransformTier::Workflow { url } => self.call_workflow(url, workflow, data).await,
                TransformTier::Generation { url, token, model } => {
                    self.call_generation(url, token, model, workflow, data).await
                }
                TransformTier::Preview => return (preview(workflow, data), warnings),
            };
            match attempt {
                Ok(output) => {
                    debug!(tier = tier.name(), workflow, "Transform succeeded");
                    return (output, warnings);
                }
                Err(e) => {
                    warn!(tier = tier.name(), workflow, error = %e, "Transform tier failed");
                    warnings.push(format!("{} transform failed: {}", tier.name(), e));
                }
            }
        }

        (preview(workflow, data), warnings)
    }

    async fn call_workflow(
        &self,
        url: &str,
        workflow: &str,
        data: &str,
    ) -> Result<TransformOutput, ProviderError> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "workflow": workflow, "data": data }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "workflow",
                status: status.as_u16(),
            });
        }
        let body: Value = serde_json::from_str(&response.text().await?)?;

        let output = match body.get("output") {
            Some(output) if !output.is_null() => output.clone(),
            _ => body.clone(),
        };
        Ok(TransformOutput {
            workflow: workflow.to_string(),
            output,
            confidence: body.get("confidence").and_then(Value::as_f64),
            raw: None,
        })
    }

    async fn call_generation(
        &self,
        url: &str,
        token: &str,
        model: &str,
        workflow: &str,
        data: &str,
    ) -> Result<TransformOutput, ProviderError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({
                "model": model,
                "input": build_transform_prompt(workflow, data),
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: "generation",
                status: status.as_u16(),
            });
        }
        let body: Value = serde_json::from_str(&response.text().await?)?;

        Ok(TransformOutput {
            workflow: format!("{}@aipipe", workflow),
            output: Value::String(extract_generation_text(&body)),
            confidence: None,
            raw: Some(body).filter(|b| !b.is_null()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_data() {
        let data = "x".repeat(200);
        let out = preview("summarize", &data);
        let text = out.output.as_str().unwrap();
        assert_eq!(text.chars().count(), 160);
        assert!(text.ends_with("..."));
        assert!(text.starts_with(&"x".repeat(157)));
        assert_eq!(out.confidence, Some(0.42));
    }

    #[test]
    fn test_preview_keeps_short_data() {
        let data = "y".repeat(160);
        let out = preview("outline", &data);
        assert_eq!(out.output, Value::String(data));
        assert_eq!(out.workflow, "outline");
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let data = "é".repeat(161);
        let out = preview("summarize", &data);
        let text = out.output.as_str().unwrap();
        assert_eq!(text.chars().filter(|c| *c == 'é').count(), 157);
    }

    #[test]
    fn test_generation_text_extraction() {
        let nested = json!({"output": [{"content": [{"text": "- one\n- two"}]}]});
        assert_eq!(extract_generation_text(&nested), "- one\n- two");

        let flat = json!({"output_text": "short"});
        assert_eq!(extract_generation_text(&flat), "short");

        let other = json!({"id": "resp_1"});
        assert_eq!(extract_generation_text(&other), r#"{"id":"resp_1"}"#);
    }

    #[test]
    fn test_prompt_wraps_input() {
        let prompt = build_transform_prompt("extract", "price: 4 USD");
        assert!(prompt.starts_with("You are an expert text transformer"));
        assert!(prompt.contains("Task: extract"));
        assert!(prompt.contains("<<<\nprice: 4 USD\n>>>"));
        assert!(prompt.ends_with("Return only the final output (no preface)."));
    }

    #[test]
    fn test_tier_order() {
        let client = reqwest::Client::new();
        let bare = TransformPipeline::from_credentials(&Credentials::default(), "m", client.clone());
        assert_eq!(bare.tier_names(), vec!["preview"]);

        let full = Credentials {
            workflow_url: Some("https://flows.example/run".to_string()),
            model_token: Some("token".to_string()),
            ..Credentials::default()
        };
        let pipeline = TransformPipeline::from_credentials(&full, "gpt-4.1-nano", client);
        assert_eq!(pipeline.tier_names(), vec!["workflow", "generation", "preview"]);
    }

    #[tokio::test]
    async fn test_blank_workflow_defaults_to_summarize() {
        let pipeline = TransformPipeline::new(reqwest::Client::new(), vec![]);
        let out = pipeline.run(Some("  "), "short").await;
        assert_eq!(out.workflow, "summarize");
        assert_eq!(out.output, json!("short"));
    }
}
