// file: src/oracle/client.rs
// description: labeling oracle HTTP client over a messages-style completion API
// reference: https://docs.anthropic.com/en/api/messages

use crate::config::OracleConfig;
use crate::error::{PipelineError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Typed failure modes for one oracle call. Transient and malformed failures
/// are retried up to the retry budget; fatal ones abort the run.
#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("transient oracle failure: {0}")]
    Transient(String),

    #[error("malformed oracle output: {0}")]
    Malformed(String),

    #[error("fatal oracle failure: {0}")]
    Fatal(String),
}

impl From<OracleError> for PipelineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Transient(msg) => PipelineError::OracleTransient(msg),
            OracleError::Malformed(msg) => PipelineError::OracleMalformed(msg),
            OracleError::Fatal(msg) => PipelineError::OracleFatal(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The external labeling oracle. Stages are written so an identical request
/// yields an identical record mutation, which keeps retries safe.
pub trait Oracle: Send + Sync {
    fn complete(
        &self,
        request: OracleRequest,
    ) -> impl Future<Output = std::result::Result<OracleResponse, OracleError>> + Send;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// HTTP client for a messages-style completion endpoint.
pub struct MessagesClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl MessagesClient {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Config(
                "oracle API key must be set via config or ANTHROPIC_API_KEY".to_string(),
            )
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Oracle for MessagesClient {
    async fn complete(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: self.temperature,
            system: request.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(
            "Calling oracle (model: {}, prompt: {} chars)",
            self.model,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());

            return Err(classify_http_failure(status, &detail));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("response body not JSON: {}", e)))?;

        let content = parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(OracleError::Malformed("empty response content".to_string()));
        }

        debug!(
            "Oracle call successful (tokens: {} in, {} out)",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );

        Ok(OracleResponse {
            content,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

fn classify_http_failure(status: StatusCode, detail: &str) -> OracleError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OracleError::Transient(format!("status {}: {}", status, detail))
    } else {
        // 401/403 and other client errors mean the request itself is wrong.
        OracleError::Fatal(format!("status {}: {}", status, detail))
    }
}

/// Pulls a JSON payload out of response content, tolerating markdown code
/// fences around it.
pub fn extract_json_payload(content: &str) -> &str {
    let trimmed = content.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                return after[..end].trim();
            }
        }
    }

    trimmed
}
