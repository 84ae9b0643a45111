//! OpenAI chat-completions adapter
//!
//! Function-calling dialect: tool calls arrive with string-encoded JSON
//! arguments inside `choices[0].message`, and each answered call must go
//! back as its own `role: "tool"` message. Since the engine appends one
//! history entry per turn, `format_tool_results` returns an array value and
//! `format_request` flattens array entries into the wire message list.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::{Config, ForemanError, ParsedResponse, Result, ToolCall, ToolDefinition, ToolResponse};
use crate::provider::traits::Provider;
use crate::provider::transport::{HttpResponse, RetryTransport};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Adapter for the OpenAI chat completions API
pub struct OpenAiProvider {
    client: Client,
    transport: RetryTransport,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .provider
            .api_key
            .clone()
            .ok_or_else(|| ForemanError::config("openai provider requires an api_key"))?;

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
impl Provider for OpenAiProvider {
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
        }))
    }

    fn format_assistant_message(&self, raw_response: &Value) -> Result<Value> {
        raw_response
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| ForemanError::provider("response has no message candidates"))
    }

    fn format_tool_results(&self, results: &[ToolResponse]) -> Value {
        let messages: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "role": "tool",
                    "tool_call_id": r.call_id,
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
        let choice = raw_response
            .pointer("/choices/0")
            .ok_or_else(|| ForemanError::provider("response has no message candidates"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| ForemanError::provider("candidate has no message"))?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
            for call in calls {
                let id = call
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ForemanError::provider("tool call without id"))?;
                let name = call
                    .pointer("/function/name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ForemanError::provider("tool call without function name"))?;
                // arguments are a string-encoded JSON object on this backend
                let input = match call.pointer("/function/arguments") {
                    Some(Value::String(s)) => serde_json::from_str(s)
                        .unwrap_or_else(|_| Value::String(s.clone())),
                    Some(other) => other.clone(),
                    None => json!({}),
                };
                tool_calls.push(ToolCall::new(id, name, input));
            }
        }

        let finish_reason = choice.get("finish_reason").and_then(|v| v.as_str());
        let done = finish_reason == Some("stop") && tool_calls.is_empty();

        Ok(ParsedResponse {
            text,
            tool_calls,
            done,
        })
    }

    async fn call(&self, request: &Value) -> Result<Value> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .transport
            .send(|| {
                let attempt = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(request);
                async move { HttpResponse::from_reqwest(attempt.send().await?).await }
            })
            .await?;

        if !response.is_success() {
            return Err(ForemanError::provider(format!(
                "OpenAI API error ({}): {}",
                response.status, response.body
            )));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| ForemanError::provider(format!("Failed to parse response: {}", e)))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        let mut config = Config::default();
        config.provider.api_key = Some("test-key".into());
        config.provider.model = "test-model".into();
        OpenAiProvider::from_config(&config).unwrap()
    }

    fn tool_call_response() -> Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "write_file",
                            "arguments": "{\"path\": \"a.txt\", \"content\": \"hi\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
    }

    #[test]
    fn parses_string_encoded_arguments() {
        let parsed = provider().parse_response(&tool_call_response()).unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "write_file");
        assert_eq!(parsed.tool_calls[0].input["path"], "a.txt");
        assert!(!parsed.done);
    }

    #[test]
    fn done_only_on_stop_without_calls() {
        let p = provider();
        let stop = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Done." },
                "finish_reason": "stop"
            }]
        });
        let parsed = p.parse_response(&stop).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.text, "Done.");
    }

    #[test]
    fn missing_candidates_is_an_error() {
        let empty = json!({ "choices": [] });
        assert!(provider().parse_response(&empty).is_err());
    }

    #[test]
    fn tool_results_flatten_into_request_messages() {
        use crate::core::ToolOutcome;

        let p = provider();
        let results = p.format_tool_results(&[
            ToolResponse {
                call_id: "call_a".into(),
                tool_name: "read_file".into(),
                outcome: ToolOutcome::success("one"),
            },
            ToolResponse {
                call_id: "call_b".into(),
                tool_name: "read_file".into(),
                outcome: ToolOutcome::success("two"),
            },
        ]);

        let history = vec![p.format_user_message("go"), results];
        let request = p.format_request("sys", &history, &[]).unwrap();
        let messages = request["messages"].as_array().unwrap();
        // system + user + two flattened tool messages
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_b");
    }

    #[test]
    fn assistant_message_is_the_raw_candidate() {
        let raw = tool_call_response();
        let msg = provider().format_assistant_message(&raw).unwrap();
        assert_eq!(msg, raw["choices"][0]["message"]);
    }
}
