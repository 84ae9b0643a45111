//! Anthropic messages API adapter
//!
//! Content-block dialect: assistant turns are arrays of `text` and
//! `tool_use` blocks, tool answers go back as `tool_result` blocks inside a
//! user message, and every call carries a native identifier.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::{Config, ForemanError, ParsedResponse, Result, ToolCall, ToolDefinition, ToolResponse};
use crate::provider::traits::Provider;
use crate::provider::transport::{HttpResponse, RetryTransport};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// Adapter for the Anthropic messages API
pub struct AnthropicProvider {
    client: Client,
    transport: RetryTransport,
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .provider
            .api_key
            .clone()
            .ok_or_else(|| ForemanError::config("anthropic provider requires an api_key"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            transport: RetryTransport::new(&config.retry),
            model: config.provider.model.clone(),
            api_key,
            base_url: config
                .provider
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn format_request(
        &self,
        system_prompt: &str,
        history: &[Value],
        tools: &[ToolDefinition],
    ) -> Result<Value> {
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        Ok(json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": history,
            "tools": tools,
        }))
    }

    fn format_assistant_message(&self, raw_response: &Value) -> Result<Value> {
        // the block array goes back exactly as received; re-shaping it would
        // break the backend's own context framing
        let content = raw_response
            .get("content")
            .ok_or_else(|| ForemanError::provider("response has no content blocks"))?;
        Ok(json!({ "role": "assistant", "content": content }))
    }

    fn format_tool_results(&self, results: &[ToolResponse]) -> Value {
        let blocks: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": r.call_id,
                    "content": r.outcome.render(),
                    "is_error": !r.outcome.ok,
                })
            })
            .collect();
        json!({ "role": "user", "content": blocks })
    }

    fn format_user_message(&self, text: &str) -> Value {
        json!({ "role": "user", "content": text })
    }

    fn parse_response(&self, raw_response: &Value) -> Result<ParsedResponse> {
        let blocks = raw_response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ForemanError::provider("response has no content blocks"))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| ForemanError::provider("tool_use block without id"))?;
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| ForemanError::provider("tool_use block without name"))?;
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    tool_calls.push(ToolCall::new(id, name, input));
                }
                _ => {}
            }
        }

        let stop_reason = raw_response.get("stop_reason").and_then(|v| v.as_str());
        let done = stop_reason == Some("end_turn") && tool_calls.is_empty();

        Ok(ParsedResponse {
            text,
            tool_calls,
            done,
        })
    }

    async fn call(&self, request: &Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .transport
            .send(|| {
                let attempt = self
                    .client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", API_VERSION)
                    .json(request);
                async move { HttpResponse::from_reqwest(attempt.send().await?).await }
            })
            .await?;

        if !response.is_success() {
            return Err(ForemanError::provider(format!(
                "Anthropic API error ({}): {}",
                response.status,
                truncate(&response.body, 500)
            )));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| ForemanError::provider(format!("Failed to parse response: {}", e)))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
