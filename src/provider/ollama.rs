//! Ollama adapter
//!
//! Local backend over `/api/chat`. Ollama's tool-calling dialect has no
//! call identifiers, so the adapter synthesizes them from a monotonic
//! counter; the loop can then correlate calls to results the same way it
//! does for cloud backends. Tool answers are `role: "tool"` messages,
//! one per call, batched as an array entry that `format_request` flattens.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::{Config, ForemanError, ParsedResponse, Result, ToolCall, ToolDefinition, ToolResponse};
use crate::provider::traits::Provider;
use crate::provider::transport::{HttpResponse, RetryTransport};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Adapter for a local Ollama server
pub struct OllamaProvider {
    client: Client,
    transport: RetryTransport,
    model: String,
    base_url: String,
    /// Source of synthesized call identifiers
    next_call_id: AtomicU64,
}

impl OllamaProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            transport: RetryTransport::new(&config.retry),
            model: config.provider.model.clone(),
            base_url: config
                .provider
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            next_call_id: AtomicU64::new(1),
        })
    }

    fn synthesize_id(&self) -> String {
        format!("call-{}", self.next_call_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn format_request(
        &self,
        system_prompt: &str,
        history: &[Value],
        tools: &[ToolDefinition],
    ) -> Result<Value> {
        let mut messages = vec![json!({ "role": "system", "content": system_prompt })];
        for entry in history {
            match entry {
                Value::Array(batch) => messages.extend(batch.iter().cloned()),
                other => messages.push(other.clone()),
            }
        }

        let tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();

        Ok(json!({
            "model": self.model,
            "messages": messages,
            "tools": tools,
            "stream": false,
        }))
    }

    fn format_assistant_message(&self, raw_response: &Value) -> Result<Value> {
        raw_response
            .get("message")
            .cloned()
            .ok_or_else(|| ForemanError::provider("response has no message"))
    }

    fn format_tool_results(&self, results: &[ToolResponse]) -> Value {
        let messages: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "role": "tool",
                    "tool_name": r.tool_name,
                    "content": r.outcome.render(),
                })
            })
            .collect();
        Value::Array(messages)
    }

    fn format_user_message(&self, text: &str) -> Value {
        json!({ "role": "user", "content": text })
    }

    fn parse_response(&self, raw_response: &Value) -> Result<ParsedResponse> {
        let message = raw_response
            .get("message")
            .ok_or_else(|| ForemanError::provider("response has no message"))?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
            for call in calls {
                let name = call
                    .pointer("/function/name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ForemanError::provider("tool call without function name"))?;
                let input = call
                    .pointer("/function/arguments")
                    .cloned()
                    .unwrap_or(json!({}));
                tool_calls.push(ToolCall::new(self.synthesize_id(), name, input));
            }
        }

        let finished = raw_response
            .get("done")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let done = finished && tool_calls.is_empty();

        Ok(ParsedResponse {
            text,
            tool_calls,
            done,
        })
    }

    async fn call(&self, request: &Value) -> Result<Value> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .transport
            .send(|| {
                let attempt = self.client.post(&url).json(request);
                let base_url = self.base_url.clone();
                async move {
                    let sent = attempt.send().await.map_err(|e| {
                        if e.is_connect() {
                            ForemanError::provider(format!(
                                "Cannot connect to Ollama at {}. Is it running?",
                                base_url
                            ))
                        } else {
                            ForemanError::from(e)
                        }
                    })?;
                    HttpResponse::from_reqwest(sent).await
                }
            })
            .await?;

        if !response.is_success() {
            return Err(ForemanError::provider(format!(
                "Ollama API error ({}): {}",
                response.status, response.body
            )));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| ForemanError::provider(format!("Failed to parse response: {}", e)))
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OllamaProvider {
        let mut config = Config::default();
        config.provider.model = "test-model".into();
        OllamaProvider::from_config(&config).unwrap()
    }

    fn tool_call_response() -> Value {
        json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "read_file", "arguments": { "path": "a.txt" } } },
                    { "function": { "name": "list_directory", "arguments": { "path": "." } } }
                ]
            },
            "done": true
        })
    }

    #[test]
    fn synthesizes_unique_call_ids() {
        let p = provider();
        let first = p.parse_response(&tool_call_response()).unwrap();
        let second = p.parse_response(&tool_call_response()).unwrap();

        let mut ids: Vec<String> = first
            .tool_calls
            .iter()
            .chain(second.tool_calls.iter())
            .map(|c| c.id.clone())
            .collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before, "synthesized ids must be unique");
    }

    #[test]
    fn tool_calls_suppress_done() {
        let parsed = provider().parse_response(&tool_call_response()).unwrap();
        assert!(!parsed.done);
        assert_eq!(parsed.tool_calls[0].name, "read_file");
    }

    #[test]
    fn plain_answer_is_done() {
        let raw = json!({
            "message": { "role": "assistant", "content": "All set." },
            "done": true
        });
        let parsed = provider().parse_response(&raw).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.text, "All set.");
    }

    #[test]
    fn assistant_turn_replays_message_verbatim() {
        let raw = tool_call_response();
        let msg = provider().format_assistant_message(&raw).unwrap();
        assert_eq!(msg, raw["message"]);
    }
}
