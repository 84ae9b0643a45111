//! Agent execution loop
//!
//! Drives one conversation against the configured backend: send history
//! plus the tool catalog, execute whatever the model asks for, feed the
//! results back, and stop on a completion signal or when the turn budget
//! runs out. Raw assistant turns are replayed verbatim; some backends
//! need their own framing back unchanged to maintain context.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{Config, Result};
use crate::agent::prompt::{initial_message, system_prompt};
use crate::provider::Provider;
use crate::request::Request;
use crate::tools::{catalog, ToolExecutor, FINISH_TOOL};

/// Loop-level result of one agent execution, returned to the caller.
/// Distinct from tool-level outcomes, which travel back to the model.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded {
        /// Title from the completion signal, if one was given
        title: Option<String>,
        /// Outcome summary (completion payload or final free text)
        summary: String,
        turns: usize,
    },
    Failed {
        reason: String,
        turns: usize,
    },
}

/// Runs the conversation loop for a single request execution
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    max_turns: usize,
    extra_prompt: Option<String>,
}

impl AgentRunner {
    pub fn new(config: &Config, provider: Arc<dyn Provider>, executor: ToolExecutor) -> Self {
        Self {
            provider,
            executor,
            max_turns: config.agent.max_turns,
            extra_prompt: config.agent.system_prompt.clone(),
        }
    }

    /// Execute the request's latest spec revision.
    ///
    /// Never returns `Err`: every failure, expected or not, is contained
    /// into a failed outcome carrying the reason.
    pub async fn run(&self, request: &Request) -> RunOutcome {
        let mut turns = 0;
        match self.drive(request, &mut turns).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(id = %request.id, turns, error = %e, "agent execution failed");
                RunOutcome::Failed {
                    reason: e.to_string(),
                    turns,
                }
            }
        }
    }

    async fn drive(&self, request: &Request, turns: &mut usize) -> Result<RunOutcome> {
        let tools = catalog();
        let system = system_prompt(self.extra_prompt.as_deref());
        let mut history = vec![self.provider.format_user_message(&initial_message(request))];

        info!(
            id = %request.id,
            spec_version = request.current_spec().version,
            max_turns = self.max_turns,
            provider = self.provider.name(),
            "starting agent execution"
        );

        for turn in 1..=self.max_turns {
            *turns = turn;

            let body = self.provider.format_request(&system, &history, &tools)?;
            let raw = self.provider.call(&body).await?;
            let parsed = self.provider.parse_response(&raw)?;

            // the backend's own assistant framing goes back unchanged
            history.push(self.provider.format_assistant_message(&raw)?);

            if parsed.done || parsed.tool_calls.is_empty() {
                debug!(id = %request.id, turn, "model signaled completion without tools");
                return Ok(RunOutcome::Succeeded {
                    title: None,
                    summary: parsed.text,
                    turns: turn,
                });
            }

            debug!(id = %request.id, turn, calls = parsed.tool_calls.len(), "executing tool calls");
            let mut results = Vec::with_capacity(parsed.tool_calls.len());
            for call in &parsed.tool_calls {
                // an explicit completion signal ends the run immediately,
                // even with calls left unexecuted this turn
                if call.name == FINISH_TOOL {
                    let title = call.get_str("title").map(str::to_string);
                    let summary = call
                        .get_str("summary")
                        .map(str::to_string)
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| parsed.text.clone());
                    info!(id = %request.id, turn, "completion signal received");
                    return Ok(RunOutcome::Succeeded {
                        title,
                        summary,
                        turns: turn,
                    });
                }
                results.push(self.executor.execute(call).await);
            }
            history.push(self.provider.format_tool_results(&results));
        }

        Ok(RunOutcome::Failed {
            reason: format!("turn limit exceeded ({} turns)", self.max_turns),
            turns: self.max_turns,
        })
    }
}
