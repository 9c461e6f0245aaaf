//! LLM providers: the Anthropic Messages API and an offline mock.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful OKR coaching assistant.";

/// Per-call generation settings.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

impl CompletionOptions {
    pub fn new(max_tokens: u32, temperature: f32, system_prompt: &str) -> Self {
        Self {
            max_tokens,
            temperature,
            system_prompt: Some(system_prompt.to_string()),
        }
    }
}

/// A text completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// Anthropic Claude over the Messages API.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("Anthropic API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: options
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", ANTHROPIC_API_BASE))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to reach Anthropic API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Upstream(format!(
                "Anthropic API error ({}): {}",
                status, body
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse Anthropic response: {}", e)))?;

        match parsed.content.into_iter().next() {
            Some(block) if block.block_type == "text" => Ok(block.text.unwrap_or_default()),
            _ => Err(Error::Upstream(
                "Unexpected response type from LLM".to_string(),
            )),
        }
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic canned responses for development without an API key.
///
/// Replies are chosen by looking for marker phrases the advisor prompts
/// always contain.
#[derive(Debug, Default, Clone)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Candidate ids listed in an alignment prompt as `ID: "<id>"`.
fn listed_ids(prompt: &str) -> Vec<&str> {
    prompt
        .split("ID: \"")
        .skip(1)
        .filter_map(|rest| rest.split_once('"').map(|(id, _)| id))
        .collect()
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        let reply = if prompt.contains("improved version of the goal title") {
            serde_json::json!({
                "improvedTitle": "Achieve industry-leading customer satisfaction",
                "explanation": "Made the goal more specific and inspiring with a clear outcome.",
                "suggestedMeasures": [
                    { "title": "Increase NPS score to 70+", "type": "INCREASE_TO", "target": 70, "unit": "points" },
                    { "title": "Achieve CSAT rating of 4.5/5", "type": "INCREASE_TO", "target": 4.5, "unit": "rating" },
                    { "title": "Reduce average response time to under 4 hours", "type": "DECREASE_TO", "target": 4, "unit": "hours" }
                ],
                "suggestedParentId": null
            })
            .to_string()
        } else if prompt.contains("SMART criteria") {
            serde_json::json!({
                "score": 7,
                "assessment": {
                    "specific": { "score": 8, "note": "Clear metric defined" },
                    "measurable": { "score": 9, "note": "Quantifiable target" },
                    "achievable": { "score": 6, "note": "Target may be ambitious" },
                    "relevant": { "score": 8, "note": "Aligns with goal" },
                    "timeBound": { "score": 7, "note": "Inherits the goal period" }
                },
                "suggestions": [
                    "Consider adding interim milestones",
                    "Add a quality metric alongside quantity"
                ],
                "risks": ["Could incentivize short-term gains"]
            })
            .to_string()
        } else if prompt.contains("Potential parent goals") {
            let suggestions: Vec<serde_json::Value> = listed_ids(prompt)
                .into_iter()
                .take(3)
                .enumerate()
                .map(|(i, id)| {
                    serde_json::json!({
                        "goalId": id,
                        "relevance": 0.9 - 0.2 * i as f64,
                        "explanation": "Strong strategic alignment"
                    })
                })
                .collect();
            serde_json::json!({ "suggestions": suggestions }).to_string()
        } else if prompt.contains("Extract all Objectives and Key Results") {
            serde_json::json!({
                "okrs": [{
                    "objective": { "title": "Delight our customers", "description": null },
                    "keyResults": [
                        { "title": "Raise NPS to 60", "measureType": "INCREASE_TO", "targetValue": 60, "unit": "points", "startValue": 40 },
                        { "title": "Launch support portal", "measureType": "MILESTONE", "targetValue": 1, "unit": null, "startValue": null }
                    ],
                    "confidence": 0.8,
                    "sourceSlide": null
                }],
                "warnings": []
            })
            .to_string()
        } else if prompt.contains("executive summary") {
            "Progress is on track with steady movement on core metrics. The main risk is timeline pressure on the final deliverable. Recommend focusing resources on critical path items.".to_string()
        } else {
            "I'm a mock AI assistant. Configure ANTHROPIC_API_KEY for real responses.".to_string()
        };
        Ok(reply)
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
