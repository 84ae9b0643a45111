//! Persisted request model
//!
//! Every document carries a `schema_version` so partially-written or
//! foreign files are rejected at load time instead of being misread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk schema version for all ledger documents
pub const SCHEMA_VERSION: u32 = 1;

/// How far the pipeline proceeds without a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Autonomy {
    /// Create the request, never execute
    IngestOnly,
    /// Run the loop and commit locally, never push or open a PR
    ExecuteLocal,
    /// Push and open a draft pull request
    DraftPr,
    /// Push, open a ready pull request, enable auto-merge
    Full,
}

impl std::fmt::Display for Autonomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Autonomy::IngestOnly => write!(f, "ingest_only"),
            Autonomy::ExecuteLocal => write!(f, "execute_local"),
            Autonomy::DraftPr => write!(f, "draft_pr"),
            Autonomy::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for Autonomy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ingest_only" => Ok(Autonomy::IngestOnly),
            "execute_local" => Ok(Autonomy::ExecuteLocal),
            "draft_pr" => Ok(Autonomy::DraftPr),
            "full" => Ok(Autonomy::Full),
            other => Err(format!(
                "unknown autonomy '{}' (expected ingest_only, execute_local, draft_pr, full)",
                other
            )),
        }
    }
}

/// A registered target repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub schema_version: u32,
    /// Unique key
    pub name: String,
    /// Clone URL of the target repository
    pub remote_url: String,
    /// Branch pull requests target
    pub default_branch: String,
    pub autonomy: Autonomy,
    pub registered_at: DateTime<Utc>,
    /// Command run in the workspace after a successful attempt; non-zero exit
    /// fails the attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
}

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Ingested,
    Executing,
    Succeeded,
    Failed,
    Retrying,
    NeedsHuman,
    Applied,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Ingested => write!(f, "ingested"),
            RequestStatus::Executing => write!(f, "executing"),
            RequestStatus::Succeeded => write!(f, "succeeded"),
            RequestStatus::Failed => write!(f, "failed"),
            RequestStatus::Retrying => write!(f, "retrying"),
            RequestStatus::NeedsHuman => write!(f, "needs_human"),
            RequestStatus::Applied => write!(f, "applied"),
        }
    }
}

/// One versioned description of intended work; immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecRevision {
    /// 1-indexed version
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub text: String,
}

/// Terminal outcome of one agent execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One execution of the agent loop against a spec revision; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-indexed per request
    pub id: u32,
    /// Spec revision this attempt targeted
    pub spec_version: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Workspace commit produced by the attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A unit of work against a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub schema_version: u32,
    /// Sequential identifier, e.g. "REQ-12"
    pub id: String,
    /// Owning project name
    pub project: String,
    /// Originating description (spec version 1 repeats it)
    pub description: String,
    /// Branch derived from the identifier; reused across attempts and amendments
    pub branch: String,
    pub status: RequestStatus,
    /// Append-only, 1-indexed by version
    pub specs: Vec<SpecRevision>,
    /// Append-only, 1-indexed by id
    pub attempts: Vec<Attempt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Pull request URL once one has been opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl Request {
    /// Create a fresh request in `ingested` state with spec version 1
    pub fn new(id: impl Into<String>, project: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        let description = description.into();
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            branch: branch_for(&id),
            id,
            project: project.into(),
            description: description.clone(),
            status: RequestStatus::Ingested,
            specs: vec![SpecRevision {
                version: 1,
                created_at: now,
                text: description,
            }],
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
            pr_url: None,
        }
    }

    /// The latest spec revision (there is always at least one)
    pub fn current_spec(&self) -> &SpecRevision {
        self.specs
            .last()
            .expect("a request always has at least one spec revision")
    }

    /// Count of attempts with a failed outcome, across the whole history
    pub fn failed_attempts(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Failed)
            .count() as u32
    }

    /// True once more than one spec revision exists
    pub fn is_amended(&self) -> bool {
        self.specs.len() > 1
    }
}

/// Deterministic branch name for a request identifier
pub fn branch_for(id: &str) -> String {
    format!("foreman/{}", id.to_lowercase())
}

/// Kind of ledger event, one durable file per occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    StatusChanged {
        from: RequestStatus,
        to: RequestStatus,
    },
    AttemptSucceeded {
        attempt: u32,
    },
    AttemptFailed {
        attempt: u32,
    },
    Amended {
        version: u32,
    },
    Applied,
}

impl EventKind {
    /// Stable slug used in log filenames and commit messages
    pub fn slug(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::StatusChanged { .. } => "status_changed",
            EventKind::AttemptSucceeded { .. } => "attempt_succeeded",
            EventKind::AttemptFailed { .. } => "attempt_failed",
            EventKind::Amended { .. } => "amended",
            EventKind::Applied => "applied",
        }
    }
}

/// A durable, timestamped event record; never edited after being written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub schema_version: u32,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LedgerEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            at: Utc::now(),
            kind,
            detail: None,
        }
    }

    pub fn with_detail(kind: EventKind, detail: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            at: Utc::now(),
            kind,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_has_one_spec_and_branch() {
        let req = Request::new("REQ-7", "demo", "Add input validation");
        assert_eq!(req.status, RequestStatus::Ingested);
        assert_eq!(req.specs.len(), 1);
        assert_eq!(req.specs[0].version, 1);
        assert_eq!(req.branch, "foreman/req-7");
        assert!(!req.is_amended());
    }

    #[test]
    fn failed_attempts_counts_all_history() {
        let mut req = Request::new("REQ-1", "demo", "x");
        for (i, outcome) in [
            AttemptOutcome::Failed,
            AttemptOutcome::Succeeded,
            AttemptOutcome::Failed,
        ]
        .iter()
        .enumerate()
        {
            req.attempts.push(Attempt {
                id: i as u32 + 1,
                spec_version: 1,
                started_at: Utc::now(),
                outcome: *outcome,
                commit: None,
                failure_reason: None,
                summary: None,
            });
        }
        assert_eq!(req.failed_attempts(), 2);
    }

    #[test]
    fn autonomy_parses_recognized_values() {
        assert_eq!("full".parse::<Autonomy>().unwrap(), Autonomy::Full);
        assert_eq!(
            "execute_local".parse::<Autonomy>().unwrap(),
            Autonomy::ExecuteLocal
        );
        assert!("yolo".parse::<Autonomy>().is_err());
    }
}
