/// Quality Client — the single point of entry for AI quality analysis.
///
/// ARCHITECTURAL RULE: no other module may call the Anthropic API directly.
/// The orchestrator reaches this through the `QualityAnalyzer` trait, so
/// tests can script outcomes without the network.
///
/// Model: claude-sonnet-4-5 (hardcoded — do not make configurable to prevent drift)
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::analysis::CompletenessResult;
use crate::models::snapshot::{AnalysisSettings, Section, SectionRecord};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all quality analysis calls.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum QualityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("quality analysis returned empty content")]
    EmptyContent,
}

/// What the pipeline sends the quality collaborator: the deep-extracted
/// section bundle plus the already-computed completeness result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRequest {
    pub subject_id: String,
    pub snapshot_excerpt: BTreeMap<Section, SectionRecord>,
    pub completeness_result: CompletenessResult,
    pub settings: AnalysisSettings,
    pub force_refresh: bool,
}

/// The quality collaborator's response. `ai_disabled` without a
/// `content_score` is the recognized "no analysis available" outcome,
/// distinct from an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityResponse {
    #[serde(default)]
    pub content_score: Option<f64>,
    #[serde(default)]
    pub section_scores: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub recommendations: Option<serde_json::Value>,
    #[serde(default)]
    pub insights: Option<serde_json::Value>,
    #[serde(default)]
    pub from_cache: Option<bool>,
    #[serde(default)]
    pub ai_disabled: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QualityResponse {
    pub fn disabled() -> Self {
        QualityResponse {
            ai_disabled: Some(true),
            ..QualityResponse::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.content_score.is_none() && self.ai_disabled.unwrap_or(false)
    }
}

/// The quality analysis collaborator seam.
#[async_trait]
pub trait QualityAnalyzer: Send + Sync {
    async fn analyze(&self, request: &QualityRequest) -> Result<QualityResponse, QualityError>;

    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Production quality analyzer backed by the Anthropic Messages API.
/// A missing API key means quality analysis is disabled — `analyze` then
/// returns the `ai_disabled` outcome instead of erroring.
#[derive(Clone)]
pub struct LlmQualityAnalyzer {
    client: Client,
    api_key: Option<String>,
}

impl LlmQualityAnalyzer {
    pub fn new(api_key: Option<String>) -> Self {
        LlmQualityAnalyzer {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Raw Messages API call. Retries on 429 and 5xx with exponential
    /// backoff; fails fast on other client errors.
    async fn call(&self, api_key: &str, prompt: &str) -> Result<MessagesResponse, QualityError> {
        let request_body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: prompts::QUALITY_SYSTEM,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<QualityError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "quality call attempt {} failed, retrying after {}ms",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(QualityError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("quality API returned {}: {}", status, body);
                last_error = Some(QualityError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(QualityError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: MessagesResponse = response.json().await?;

            debug!(
                "quality call succeeded: input_tokens={}, output_tokens={}",
                parsed.usage.input_tokens, parsed.usage.output_tokens
            );

            return Ok(parsed);
        }

        Err(last_error.unwrap_or(QualityError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl QualityAnalyzer for LlmQualityAnalyzer {
    async fn analyze(&self, request: &QualityRequest) -> Result<QualityResponse, QualityError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(QualityResponse::disabled());
        };

        let prompt = prompts::build_quality_prompt(request)?;
        let response = self.call(api_key, &prompt).await?;

        let text = response.text().ok_or(QualityError::EmptyContent)?;
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(QualityError::Parse)
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
