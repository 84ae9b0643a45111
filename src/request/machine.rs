//! Request lifecycle state machine
//!
//! The transition table is the single source of truth for legal status
//! changes. Violations are caller bugs and surface as errors immediately;
//! they are never retried.

use chrono::Utc;
use tracing::debug;

use crate::core::error::{ForemanError, Result};
use crate::request::types::{
    Attempt, AttemptOutcome, Request, RequestStatus, SpecRevision,
};

/// Allowed targets for each source status
pub fn allowed_targets(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;
    match from {
        Ingested => &[Executing],
        Executing => &[Succeeded, Failed],
        // re-execution from succeeded models an amendment
        Succeeded => &[Applied, Executing],
        Failed => &[Retrying, NeedsHuman],
        Retrying => &[Executing],
        // manual override
        NeedsHuman => &[Executing],
        // further amendment
        Applied => &[Executing],
    }
}

/// Check whether `from -> to` is in the transition table
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Apply a status transition, or fail with the offending pair
pub fn transition(request: &mut Request, to: RequestStatus) -> Result<()> {
    let from = request.status;
    if !can_transition(from, to) {
        return Err(ForemanError::InvalidTransition { from, to });
    }
    debug!(id = %request.id, %from, %to, "status transition");
    request.status = to;
    request.updated_at = Utc::now();
    Ok(())
}

/// Record a finished attempt and move the request per the escalation policy.
///
/// A succeeded attempt forces `succeeded`. A failed attempt counts every
/// failed attempt in the request's history; at `max_failed_attempts` the
/// request escalates through `failed` to `needs_human`, otherwise it stops
/// at `failed`. Returns the transitions stepped through.
pub fn record_attempt(
    request: &mut Request,
    attempt: Attempt,
    max_failed_attempts: u32,
) -> Result<Vec<(RequestStatus, RequestStatus)>> {
    let outcome = attempt.outcome;
    request.attempts.push(attempt);

    let path: &[RequestStatus] = match outcome {
        AttemptOutcome::Succeeded => &[RequestStatus::Succeeded],
        AttemptOutcome::Failed => {
            if request.failed_attempts() >= max_failed_attempts {
                &[RequestStatus::Failed, RequestStatus::NeedsHuman]
            } else {
                &[RequestStatus::Failed]
            }
        }
    };

    let mut hops = Vec::with_capacity(path.len());
    for &target in path {
        let from = request.status;
        transition(request, target)?;
        hops.push((from, target));
    }
    Ok(hops)
}

/// Append a spec revision to a finished request and send it back to work.
///
/// Only legal from `succeeded` or `applied`; the request keeps its id and
/// branch, modeling iterative follow-up on one unit of change.
pub fn amend(request: &mut Request, text: impl Into<String>) -> Result<u32> {
    match request.status {
        RequestStatus::Succeeded | RequestStatus::Applied => {}
        status => {
            return Err(ForemanError::Ineligible {
                id: request.id.clone(),
                status,
                operation: "amended",
            })
        }
    }

    let version = request.specs.len() as u32 + 1;
    request.specs.push(SpecRevision {
        version,
        created_at: Utc::now(),
        text: text.into(),
    });
    transition(request, RequestStatus::Executing)?;
    debug!(id = %request.id, version, "spec amended");
    Ok(version)
}

/// Put a stalled request back on the path to execution.
///
/// `force` allows a retry from any non-executing status (discarding prior
/// workspace state is the pipeline's job); without it only `failed` and
/// `needs_human` are eligible. Returns the transitions stepped through so
/// every hop can be durably recorded.
pub fn begin_retry(
    request: &mut Request,
    force: bool,
) -> Result<Vec<(RequestStatus, RequestStatus)>> {
    let ineligible = |request: &Request| ForemanError::Ineligible {
        id: request.id.clone(),
        status: request.status,
        operation: "retried",
    };

    if request.status == RequestStatus::Executing {
        return Err(ineligible(request));
    }

    let path: &[RequestStatus] = match request.status {
        // failed steps through the table's retrying hop
        RequestStatus::Failed => &[RequestStatus::Retrying, RequestStatus::Executing],
        RequestStatus::NeedsHuman => &[RequestStatus::Executing],
        _ if force => &[RequestStatus::Executing],
        _ => return Err(ineligible(request)),
    };

    let mut hops = Vec::with_capacity(path.len());
    for &target in path {
        let from = request.status;
        transition(request, target)?;
        hops.push((from, target));
    }
    Ok(hops)
}
