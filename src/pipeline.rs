//! Request pipeline
//!
//! Wires the pieces together for one request at a time: ledger bookkeeping,
//! workspace preparation, the agent loop, post-run commit and test checks,
//! and the autonomy-gated push/pull-request steps. The workspace is
//! exclusively owned by the in-flight execution; the ledger serializes its
//! own mutations at one commit each.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use crate::agent::{AgentRunner, RunOutcome};
use crate::core::{Config, ForemanError, Result};
use crate::hosting::{ChangeRequest, ChangeRequestHost};
use crate::ledger::LedgerStore;
use crate::provider::Provider;
use crate::request::{
    amend as amend_request, begin_retry, record_attempt, transition, Attempt, AttemptOutcome,
    Autonomy, EventKind, LedgerEvent, Project, Request, RequestStatus, SCHEMA_VERSION,
};
use crate::tools::ToolExecutor;
use crate::workspace::Workspace;

/// Cap on failure reasons persisted to the ledger
const REASON_LIMIT: usize = 2000;

/// Orchestrates the full lifecycle of requests
pub struct Pipeline {
    config: Config,
    ledger: LedgerStore,
    provider: Arc<dyn Provider>,
    host: Option<Arc<dyn ChangeRequestHost>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        provider: Arc<dyn Provider>,
        host: Option<Arc<dyn ChangeRequestHost>>,
    ) -> Result<Self> {
        let ledger = LedgerStore::open(&config.ledger)?;
        Ok(Self {
            config,
            ledger,
            provider,
            host,
        })
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Register (or update) a project
    pub fn register_project(
        &self,
        name: &str,
        remote_url: &str,
        default_branch: &str,
        autonomy: Option<Autonomy>,
        test_command: Option<String>,
    ) -> Result<Project> {
        // remotes are either real URLs or local paths
        if Url::parse(remote_url).is_err() && !std::path::Path::new(remote_url).exists() {
            return Err(ForemanError::config(format!(
                "remote '{}' is neither a valid URL nor an existing path",
                remote_url
            )));
        }

        let project = Project {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            remote_url: remote_url.to_string(),
            default_branch: default_branch.to_string(),
            autonomy: autonomy.unwrap_or(self.config.policy.default_autonomy),
            registered_at: Utc::now(),
            test_command,
        };
        self.ledger.save_project(&project)?;
        Ok(project)
    }

    /// Create a request and, unless the project is ingest-only, execute it
    pub async fn ingest(&self, project_name: &str, description: &str) -> Result<Request> {
        let project = self.ledger.load_project(project_name)?;
        let request = self.ledger.create_request(project_name, description)?;

        if project.autonomy == Autonomy::IngestOnly {
            info!(id = %request.id, "ingest-only project, stopping after creation");
            return Ok(request);
        }
        self.execute(&request.id, false).await
    }

    /// Run one attempt against a request's latest spec revision.
    ///
    /// `force` permits re-execution from any non-executing status and
    /// rebuilds the branch from scratch.
    pub async fn execute(&self, id: &str, force: bool) -> Result<Request> {
        let mut request = self.ledger.load_request(id)?;
        let project = self.ledger.load_project(&request.project)?;

        // move to executing, recording every hop
        let mut events = Vec::new();
        match request.status {
            // an amendment has already forced executing; just run
            RequestStatus::Executing => {}
            RequestStatus::Ingested => {
                transition(&mut request, RequestStatus::Executing)?;
                events.push(LedgerEvent::new(EventKind::StatusChanged {
                    from: RequestStatus::Ingested,
                    to: RequestStatus::Executing,
                }));
            }
            _ => {
                for (from, to) in begin_retry(&mut request, force)? {
                    events.push(LedgerEvent::new(EventKind::StatusChanged { from, to }));
                }
            }
        }
        if !events.is_empty() {
            self.ledger.record_all(&request, events)?;
        }

        let attempt = self.run_attempt(&mut request, &project, force).await;
        let attempt_id = attempt.id;
        let outcome = attempt.outcome;
        let reason = attempt.failure_reason.clone();

        let hops = record_attempt(
            &mut request,
            attempt,
            self.config.policy.max_failed_attempts,
        )?;

        let mut events = vec![match outcome {
            AttemptOutcome::Succeeded => {
                LedgerEvent::new(EventKind::AttemptSucceeded { attempt: attempt_id })
            }
            AttemptOutcome::Failed => {
                let kind = EventKind::AttemptFailed { attempt: attempt_id };
                match reason {
                    Some(r) => LedgerEvent::with_detail(kind, r),
                    None => LedgerEvent::new(kind),
                }
            }
        }];
        events.extend(
            hops.iter()
                .map(|&(from, to)| LedgerEvent::new(EventKind::StatusChanged { from, to })),
        );
        self.ledger.record_all(&request, events)?;

        info!(id = %request.id, attempt = attempt_id, status = %request.status, "attempt recorded");
        Ok(request)
    }

    /// Append a spec revision to a finished request and re-execute
    pub async fn amend(&self, id: &str, text: &str) -> Result<Request> {
        let mut request = self.ledger.load_request(id)?;
        let from = request.status;
        let version = amend_request(&mut request, text)?;

        self.ledger.record_all(
            &request,
            vec![
                LedgerEvent::with_detail(EventKind::Amended { version }, text),
                LedgerEvent::new(EventKind::StatusChanged {
                    from,
                    to: RequestStatus::Executing,
                }),
            ],
        )?;
        self.execute(id, false).await
    }

    /// Mark a succeeded request as applied (merged/accepted downstream)
    pub fn apply(&self, id: &str) -> Result<Request> {
        let mut request = self.ledger.load_request(id)?;
        let from = request.status;
        transition(&mut request, RequestStatus::Applied)?;

        self.ledger.record_all(
            &request,
            vec![
                LedgerEvent::new(EventKind::Applied),
                LedgerEvent::new(EventKind::StatusChanged {
                    from,
                    to: RequestStatus::Applied,
                }),
            ],
        )?;
        Ok(request)
    }

    /// One attempt: workspace, agent loop, commit, tests, autonomy steps.
    /// Infrastructure failures become failed attempts, never stray errors;
    /// every path must end in a recorded attempt.
    async fn run_attempt(&self, request: &mut Request, project: &Project, force: bool) -> Attempt {
        let attempt_id = request.attempts.len() as u32 + 1;
        let spec_version = request.current_spec().version;
        let started_at = Utc::now();

        let failed = |reason: String| Attempt {
            id: attempt_id,
            spec_version,
            started_at,
            outcome: AttemptOutcome::Failed,
            commit: None,
            failure_reason: Some(clip_reason(&reason)),
            summary: None,
        };

        let workspace = match Workspace::prepare(&self.config.workspace.root, project) {
            Ok(ws) => ws,
            Err(e) => return failed(e.to_string()),
        };
        if let Err(e) = workspace.checkout_branch(&request.branch, force) {
            return failed(e.to_string());
        }

        let runner = AgentRunner::new(
            &self.config,
            Arc::clone(&self.provider),
            ToolExecutor::new(workspace.path()),
        );
        let (title, summary) = match runner.run(request).await {
            RunOutcome::Succeeded { title, summary, .. } => (title, summary),
            RunOutcome::Failed { reason, .. } => return failed(reason),
        };

        // a successful run must actually have changed something
        let commit_message = match &title {
            Some(t) => format!("{}: {}", request.id, t),
            None => format!("{}: agent changes", request.id),
        };
        match workspace.commit_all(&commit_message) {
            Ok(true) => {}
            Ok(false) => {
                return failed("agent reported success but no changes were committed".to_string())
            }
            Err(e) => return failed(e.to_string()),
        }

        if let Some(test_command) = &project.test_command {
            let result = ToolExecutor::new(workspace.path())
                .run_shell(test_command)
                .await;
            if !result.ok {
                return failed(format!("test command could not run: {}", result.render()));
            }
            let exit = result.payload["exit_code"].as_i64().unwrap_or(-1);
            if exit != 0 {
                return failed(format!(
                    "test command exited {}: {}{}",
                    exit,
                    result.payload["stdout"].as_str().unwrap_or(""),
                    result.payload["stderr"].as_str().unwrap_or(""),
                ));
            }
        }

        let commit = match workspace.head_sha() {
            Ok(sha) => Some(sha),
            Err(e) => return failed(e.to_string()),
        };

        match project.autonomy {
            Autonomy::IngestOnly | Autonomy::ExecuteLocal => {}
            Autonomy::DraftPr | Autonomy::Full => {
                if let Err(e) = workspace.push(&request.branch) {
                    return failed(e.to_string());
                }
                if let Err(e) = self.open_change_request(request, project, &title, &summary).await
                {
                    return failed(e.to_string());
                }
            }
        }

        Attempt {
            id: attempt_id,
            spec_version,
            started_at,
            outcome: AttemptOutcome::Succeeded,
            commit,
            failure_reason: None,
            summary: Some(summary),
        }
    }

    /// Open the pull request for a pushed branch, or update nothing if one
    /// is already open (amendments keep pushing to the same branch)
    async fn open_change_request(
        &self,
        request: &mut Request,
        project: &Project,
        title: &Option<String>,
        summary: &str,
    ) -> Result<()> {
        if request.pr_url.is_some() {
            return Ok(());
        }
        let host = self
            .host
            .as_ref()
            .ok_or_else(|| ForemanError::hosting("pull request requested but no host configured"))?;
        let repo = repo_slug(&project.remote_url).ok_or_else(|| {
            ForemanError::hosting(format!(
                "cannot derive a repository slug from '{}'",
                project.remote_url
            ))
        })?;

        let change = ChangeRequest {
            repo: repo.clone(),
            branch: request.branch.clone(),
            base: project.default_branch.clone(),
            title: title.clone().unwrap_or_else(|| request.description.clone()),
            body: summary.to_string(),
            draft: project.autonomy == Autonomy::DraftPr,
        };
        let url = host.open(&change).await?;
        info!(id = %request.id, %url, "pull request opened");

        if project.autonomy == Autonomy::Full {
            if let Err(e) = host.enable_auto_merge(&repo, &url).await {
                // best-effort only
                warn!(id = %request.id, error = %e, "auto-merge could not be enabled");
            }
        }
        request.pr_url = Some(url);
        Ok(())
    }
}

/// Derive "owner/name" from a remote: the last two path segments of the
/// URL (or ssh shorthand, or plain path), with any `.git` suffix dropped
fn repo_slug(remote_url: &str) -> Option<String> {
    let trimmed = remote_url.strip_suffix(".git").unwrap_or(remote_url);

    // git@host:owner/name shorthand has no scheme; take the part after ':'
    let path = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => match trimmed.split_once(':') {
            Some((head, rest)) if head.contains('@') => rest,
            _ => trimmed,
        },
    };

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return None;
    }
    Some(format!(
        "{}/{}",
        segments[segments.len() - 2],
        segments[segments.len() - 1]
    ))
}

fn clip_reason(reason: &str) -> String {
    if reason.len() <= REASON_LIMIT {
        return reason.to_string();
    }
    let mut end = REASON_LIMIT;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &reason[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_slug_handles_common_shapes() {
        assert_eq!(
            repo_slug("https://github.com/acme/widgets.git").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(
            repo_slug("https://github.com/acme/widgets").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(
            repo_slug("git@github.com:acme/widgets.git").as_deref(),
            Some("acme/widgets")
        );
        // plain paths keep their last two segments; a bare name has no slug
        assert_eq!(
            repo_slug("/srv/mirrors/acme/widgets.git").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(repo_slug("/widgets.git"), None);
    }

    #[test]
    fn long_reasons_are_clipped() {
        let long = "x".repeat(5000);
        let clipped = clip_reason(&long);
        assert!(clipped.len() < 2100);
        assert!(clipped.ends_with("(truncated)"));

        assert_eq!(clip_reason("short"), "short");
    }
}
