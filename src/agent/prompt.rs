//! Prompt assembly for agent executions

use crate::request::{AttemptOutcome, Request};
use crate::tools::FINISH_TOOL;

/// Build the system prompt for an execution
pub fn system_prompt(extra: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You are an autonomous software engineer working in a checked-out repository.

## How to work
- Inspect before you change: read files, list directories, and search to build context.
- Make the smallest change that satisfies the request.
- Use `edit_file` for targeted changes; include enough context to make the target unique.
- Use `execute_command` to build or run tests when the project provides them.
- Never run version-control commands; committing and pushing are handled for you.

## Finishing
When the requested work is complete, call `{}` with a short title and a
summary of what you changed. Do not call it before the work is done."#,
        FINISH_TOOL
    );

    if let Some(extra) = extra {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }
    prompt
}

/// Build the initial user message for the latest spec revision.
///
/// Amendments carry a context block so the model builds on committed work
/// instead of redoing or reverting it.
pub fn initial_message(request: &Request) -> String {
    if !request.is_amended() {
        return request.current_spec().text.clone();
    }

    let mut message = String::from(
        "This is a follow-up amendment to work that is already committed on this branch.\n\
         Do NOT redo or revert the earlier work; build on top of it.\n\n\
         ## Earlier requests\n",
    );
    for spec in &request.specs[..request.specs.len() - 1] {
        message.push_str(&format!("{}. {}\n", spec.version, spec.text));
    }

    let completed: Vec<&str> = request
        .attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Succeeded)
        .filter_map(|a| a.summary.as_deref())
        .collect();
    if !completed.is_empty() {
        message.push_str("\n## Work already completed\n");
        for summary in completed {
            message.push_str(&format!("- {}\n", summary));
        }
    }

    message.push_str("\n## Current request\n");
    message.push_str(&request.current_spec().text);
    message
}
