//! Provider trait for abstracting model backends
//!
//! Each backend speaks its own tool-calling dialect: role names, content
//! nesting, and call identifiers all differ. Adapters translate between the
//! backend-neutral catalog/history and the wire shape, and MUST preserve
//! the backend's own assistant framing so a turn can be replayed verbatim.

use async_trait::async_trait;

use crate::core::{ParsedResponse, Result, ToolDefinition, ToolResponse};

/// Trait for model backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Build the full backend request from the system prompt, the running
    /// message history (backend-shaped values), and the tool catalog
    fn format_request(
        &self,
        system_prompt: &str,
        history: &[serde_json::Value],
        tools: &[ToolDefinition],
    ) -> Result<serde_json::Value>;

    /// Extract the assistant turn from a raw response for verbatim replay.
    /// Some backends require their own content framing back unchanged to
    /// maintain context, so this must not re-shape anything.
    fn format_assistant_message(&self, raw_response: &serde_json::Value)
        -> Result<serde_json::Value>;

    /// Map answered tool calls into the backend's "tool answered" message
    fn format_tool_results(&self, results: &[ToolResponse]) -> serde_json::Value;

    /// Wrap plain text as a user message
    fn format_user_message(&self, text: &str) -> serde_json::Value;

    /// Normalize a raw response. `done` is true only when the backend
    /// signals a natural end-of-turn and requested no tool calls.
    fn parse_response(&self, raw_response: &serde_json::Value) -> Result<ParsedResponse>;

    /// Send a formatted request to the backend, routed through the retry
    /// transport, returning the raw response body as JSON
    async fn call(&self, request: &serde_json::Value) -> Result<serde_json::Value>;

    /// Backend name for diagnostics
    fn name(&self) -> &'static str;
}
