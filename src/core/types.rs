//! Shared types used across Foreman modules
//!
//! Backend-neutral tool-calling shapes. Conversation history entries are
//! raw `serde_json::Value` messages in the backend's own framing so that
//! assistant turns can be replayed verbatim on the next call.

use serde::{Deserialize, Serialize};

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier; synthesized by adapters whose backend has none
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub input: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Get a string argument by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(|v| v.as_str())
    }

    /// Get a required string argument by key, or a structured error payload
    pub fn require_str(&self, key: &str) -> std::result::Result<&str, ToolOutcome> {
        self.get_str(key)
            .ok_or_else(|| ToolOutcome::error(format!("missing required argument '{}'", key)))
    }
}

/// The answer to exactly one tool call, fed back to the model
#[derive(Debug, Clone)]
pub struct ToolResponse {
    /// Identifier of the call being answered
    pub call_id: String,
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Success or structured-error payload
    pub outcome: ToolOutcome,
}

/// Result of executing a tool: a success payload or a structured error,
/// never both. Tool errors are ordinary data for the model, not `Err`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the execution succeeded
    pub ok: bool,
    /// Payload on success, error description on failure
    pub payload: serde_json::Value,
}

impl ToolOutcome {
    /// Create a success outcome with a plain-text payload
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload: serde_json::Value::String(text.into()),
        }
    }

    /// Create a success outcome with a structured payload
    pub fn success_with(payload: serde_json::Value) -> Self {
        Self { ok: true, payload }
    }

    /// Create a structured error outcome
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: serde_json::json!({ "error": message.into() }),
        }
    }

    /// Render the payload as text for backends that expect string results
    pub fn render(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Definition of a tool in the backend-neutral catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool
    pub name: String,
    /// Natural-language description
    pub description: String,
    /// JSON Schema for the input object
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A model response normalized out of the backend's wire shape
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    /// Free text returned by the model (may be empty)
    pub text: String,
    /// Tool calls requested this turn, in order
    pub tool_calls: Vec<ToolCall>,
    /// True only on a natural end-of-turn with zero tool calls
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_arguments() {
        let call = ToolCall::new("c1", "read_file", serde_json::json!({ "path": "a.txt" }));
        assert_eq!(call.get_str("path"), Some("a.txt"));
        assert!(call.require_str("missing").is_err());
    }

    #[test]
    fn outcome_is_success_or_error() {
        let ok = ToolOutcome::success("contents");
        assert!(ok.ok);
        assert_eq!(ok.render(), "contents");

        let err = ToolOutcome::error("not found");
        assert!(!err.ok);
        assert_eq!(err.payload["error"], "not found");
    }
}
