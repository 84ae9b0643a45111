//! Ledger store
//!
//! Append-only persistence for projects, requests, and their event logs.
//! One JSON document per request, one JSON document per event, and one git
//! commit per logical mutation across the whole tree. Documents are
//! validated at load time; anything malformed is rejected as corruption
//! rather than silently skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::config::LedgerConfig;
use crate::core::{ForemanError, Result};
use crate::ledger::repo::LedgerRepo;
use crate::request::{EventKind, LedgerEvent, Project, Request, SCHEMA_VERSION};

/// First identifier handed out by a fresh ledger
const FIRST_ID: u32 = 1;

/// Durable, commit-backed store of every request and its history
pub struct LedgerStore {
    root: PathBuf,
    repo: LedgerRepo,
}

impl LedgerStore {
    /// Open (or create) the ledger at the configured root
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let repo = LedgerRepo::new(&config.root);
        repo.init_if_needed()?;
        Ok(Self {
            root: config.root.clone(),
            repo,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ---- projects ----

    fn project_path(&self, name: &str) -> PathBuf {
        self.root.join("projects").join(format!("{}.json", name))
    }

    /// Register or update a project, committing the mutation
    pub fn save_project(&self, project: &Project) -> Result<()> {
        write_json(&self.project_path(&project.name), project)?;
        self.repo
            .commit_all(&format!("project {}: registered", project.name))?;
        info!(project = %project.name, "project registered");
        Ok(())
    }

    pub fn load_project(&self, name: &str) -> Result<Project> {
        let path = self.project_path(name);
        if !path.exists() {
            return Err(ForemanError::UnknownProject(name.to_string()));
        }
        let project: Project = read_json(&path)?;
        if project.schema_version != SCHEMA_VERSION {
            return Err(corrupt(&path, format!(
                "unsupported schema version {}",
                project.schema_version
            )));
        }
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let dir = self.root.join("projects");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut projects = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let project: Project = read_json(&path)?;
                projects.push(project);
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    // ---- requests ----

    fn request_dir(&self, id: &str) -> PathBuf {
        self.root.join("requests").join(id)
    }

    fn request_path(&self, id: &str) -> PathBuf {
        self.request_dir(id).join("request.json")
    }

    fn log_dir(&self, id: &str) -> PathBuf {
        self.request_dir(id).join("log")
    }

    /// Next sequential identifier: scan existing ids, take the maximum
    /// numeric suffix plus one. Gaps are never reused.
    pub fn next_request_id(&self) -> Result<String> {
        let dir = self.root.join("requests");
        if !dir.exists() {
            return Ok(format!("REQ-{}", FIRST_ID));
        }
        let mut max = 0u32;
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = name.strip_prefix("REQ-").and_then(|s| s.parse::<u32>().ok()) {
                max = max.max(n);
            }
        }
        if max == 0 {
            Ok(format!("REQ-{}", FIRST_ID))
        } else {
            Ok(format!("REQ-{}", max + 1))
        }
    }

    /// Create a request for a registered project and durably record it
    pub fn create_request(&self, project: &str, description: &str) -> Result<Request> {
        // creation must reference a real project
        self.load_project(project)?;

        let id = self.next_request_id()?;
        let request = Request::new(id, project, description);
        self.record(&request, LedgerEvent::new(EventKind::Created))?;
        info!(id = %request.id, project, "request created");
        Ok(request)
    }

    /// Persist the request document, append one event, and commit the
    /// whole tree exactly once with a deterministic message
    pub fn record(&self, request: &Request, event: LedgerEvent) -> Result<()> {
        self.record_all(request, vec![event])
    }

    /// Like [`record`](Self::record) for a batch of events belonging to one
    /// logical mutation: every event file is written, the tree commits once,
    /// labeled after the last event
    pub fn record_all(&self, request: &Request, events: Vec<LedgerEvent>) -> Result<()> {
        let last = match events.last() {
            Some(event) => describe(&event.kind),
            None => return Ok(()),
        };

        write_json(&self.request_path(&request.id), request)?;
        for (i, event) in events.iter().enumerate() {
            let stamp = event.at.format("%Y%m%dT%H%M%S%6fZ");
            let filename = format!("{}-{:02}-{}.json", stamp, i, event.kind.slug());
            write_json(&self.log_dir(&request.id).join(filename), event)?;
            debug!(id = %request.id, event = event.kind.slug(), "ledger mutation recorded");
        }

        let message = format!("{}: {}", request.id, last);
        self.repo.commit_all(&message)?;
        Ok(())
    }

    /// Load a request, rejecting corrupt documents
    pub fn load_request(&self, id: &str) -> Result<Request> {
        let path = self.request_path(id);
        if !path.exists() {
            return Err(ForemanError::UnknownRequest(id.to_string()));
        }
        let request: Request = read_json(&path)?;
        if request.schema_version != SCHEMA_VERSION {
            return Err(corrupt(&path, format!(
                "unsupported schema version {}",
                request.schema_version
            )));
        }
        if request.specs.is_empty() {
            return Err(corrupt(&path, "request has no spec revisions".to_string()));
        }
        Ok(request)
    }

    /// All requests, ordered by numeric identifier
    pub fn list_requests(&self) -> Result<Vec<Request>> {
        let dir = self.root.join("requests");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut requests = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy().into_owned();
            if name.starts_with("REQ-") {
                requests.push(self.load_request(&name)?);
            }
        }
        requests.sort_by_key(|r| {
            r.id.strip_prefix("REQ-")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(u32::MAX)
        });
        Ok(requests)
    }

    /// Event history of one request, chronologically
    pub fn load_events(&self, id: &str) -> Result<Vec<LedgerEvent>> {
        let dir = self.log_dir(id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        // timestamped filenames sort chronologically
        files.sort();

        let mut events = Vec::with_capacity(files.len());
        for path in files {
            let event: LedgerEvent = read_json(&path)?;
            if event.schema_version != SCHEMA_VERSION {
                return Err(corrupt(&path, format!(
                    "unsupported schema version {}",
                    event.schema_version
                )));
            }
            events.push(event);
        }
        Ok(events)
    }
}

/// Short deterministic description used in commit messages
fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::Created => "created".to_string(),
        EventKind::StatusChanged { from, to } => format!("status {} -> {}", from, to),
        EventKind::AttemptSucceeded { attempt } => format!("attempt {} succeeded", attempt),
        EventKind::AttemptFailed { attempt } => format!("attempt {} failed", attempt),
        EventKind::Amended { version } => format!("amended to v{}", version),
        EventKind::Applied => "applied".to_string(),
    }
}

fn corrupt(path: &Path, detail: impl Into<String>) -> ForemanError {
    ForemanError::LedgerCorrupt {
        path: path.display().to_string(),
        detail: detail.into(),
    }
}

/// Atomic JSON write: temp file then rename, parents created as needed
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| ForemanError::ledger(format!("path has no parent: {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &buf)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| corrupt(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::request::Autonomy;

    fn store() -> (TempDir, LedgerStore) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(&LedgerConfig {
            root: dir.path().to_path_buf(),
        })
        .unwrap();
        (dir, store)
    }

    fn project(name: &str) -> Project {
        Project {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            remote_url: "https://example.com/demo.git".to_string(),
            default_branch: "main".to_string(),
            autonomy: Autonomy::ExecuteLocal,
            registered_at: Utc::now(),
            test_command: None,
        }
    }

    #[test]
    fn project_round_trip() {
        let (_dir, store) = store();
        store.save_project(&project("demo")).unwrap();
        let loaded = store.load_project("demo").unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.autonomy, Autonomy::ExecuteLocal);

        assert!(matches!(
            store.load_project("nope"),
            Err(ForemanError::UnknownProject(_))
        ));
    }

    #[test]
    fn ids_are_max_suffix_plus_one() {
        let (dir, store) = store();
        assert_eq!(store.next_request_id().unwrap(), "REQ-1");

        for n in [1u32, 2, 4] {
            fs::create_dir_all(dir.path().join("requests").join(format!("REQ-{}", n))).unwrap();
        }
        // gaps are not reused: {1, 2, 4} -> 5
        assert_eq!(store.next_request_id().unwrap(), "REQ-5");
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_dir, store) = store();
        store.save_project(&project("demo")).unwrap();
        let request = store.create_request("demo", "Add input validation").unwrap();
        assert_eq!(request.id, "REQ-1");

        let loaded = store.load_request("REQ-1").unwrap();
        assert_eq!(loaded.description, "Add input validation");
        assert_eq!(loaded.specs.len(), 1);

        let events = store.load_events("REQ-1").unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::Created));
    }

    #[test]
    fn creation_requires_a_registered_project() {
        let (_dir, store) = store();
        assert!(matches!(
            store.create_request("ghost", "x"),
            Err(ForemanError::UnknownProject(_))
        ));
    }

    #[test]
    fn every_mutation_is_one_commit_and_noops_are_skipped() {
        let (_dir, store) = store();
        store.save_project(&project("demo")).unwrap();
        let commits_after_project = store.repo.commit_count().unwrap();

        let request = store.create_request("demo", "x").unwrap();
        assert_eq!(store.repo.commit_count().unwrap(), commits_after_project + 1);

        // identical document + new event file still commits (the event is new)
        store
            .record(&request, LedgerEvent::new(EventKind::Applied))
            .unwrap();
        assert_eq!(store.repo.commit_count().unwrap(), commits_after_project + 2);
    }

    #[test]
    fn corrupt_documents_are_rejected_at_load() {
        let (dir, store) = store();
        store.save_project(&project("demo")).unwrap();
        store.create_request("demo", "x").unwrap();

        let path = dir.path().join("requests/REQ-1/request.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            store.load_request("REQ-1"),
            Err(ForemanError::LedgerCorrupt { .. })
        ));

        // wrong schema version is corruption too
        fs::write(&path, r#"{"schema_version": 99}"#).unwrap();
        assert!(matches!(
            store.load_request("REQ-1"),
            Err(ForemanError::LedgerCorrupt { .. })
        ));
    }

    #[test]
    fn events_sort_chronologically() {
        let (_dir, store) = store();
        store.save_project(&project("demo")).unwrap();
        let request = store.create_request("demo", "x").unwrap();

        store
            .record(
                &request,
                LedgerEvent::new(EventKind::StatusChanged {
                    from: crate::request::RequestStatus::Ingested,
                    to: crate::request::RequestStatus::Executing,
                }),
            )
            .unwrap();
        store
            .record(&request, LedgerEvent::new(EventKind::AttemptSucceeded { attempt: 1 }))
            .unwrap();

        let events = store.load_events(&request.id).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].at <= w[1].at));
        assert!(matches!(events[0].kind, EventKind::Created));
        assert!(matches!(events[2].kind, EventKind::AttemptSucceeded { .. }));
    }
}
