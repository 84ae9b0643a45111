//! Tool executor
//!
//! Executes the catalog against one workspace root. Tool inputs come from a
//! remote model, so every path is confined to the root before any
//! filesystem call; escaping the sandbox is a structured error like any
//! other. Failures never bubble out as `Err`; the loop feeds them back to
//! the model as ordinary results so it can self-correct.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use serde_json::json;
use tokio::process::Command;
use tracing::debug;

use crate::core::{ToolCall, ToolOutcome, ToolResponse};
use crate::tools::catalog::FINISH_TOOL;

/// Hidden from listings; mutating it is the pipeline's job
const VCS_DIR: &str = ".git";

/// Well-known git empty-tree object, diffed against before the first commit
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Cap on captured command/search output fed back to the model
const OUTPUT_LIMIT: usize = 20_000;

/// Executes sandboxed tools against a single workspace directory
pub struct ToolExecutor {
    root: PathBuf,
}

impl ToolExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute one tool call. Always returns a response; unknown tools and
    /// tool failures are structured error payloads.
    pub async fn execute(&self, call: &ToolCall) -> ToolResponse {
        debug!(tool = %call.name, id = %call.id, "executing tool");
        let outcome = match call.name.as_str() {
            "read_file" => self.read_file(call),
            "write_file" => self.write_file(call),
            "edit_file" => self.edit_file(call),
            "delete_file" => self.delete_file(call),
            "list_directory" => self.list_directory(call),
            "get_file_info" => self.get_file_info(call),
            "execute_command" => self.execute_command(call).await,
            "search_files" => self.search_files(call).await,
            "find_files" => self.find_files(call).await,
            "view_diff" => self.view_diff().await,
            FINISH_TOOL => ToolOutcome::success("completion signal acknowledged"),
            other => ToolOutcome::error(format!("unknown tool '{}'", other)),
        };

        ToolResponse {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome,
        }
    }

    /// Join a model-supplied path under the root, rejecting escapes.
    ///
    /// The file may not exist yet, so this normalizes components instead of
    /// canonicalizing: absolute paths and any `..` that would climb above
    /// the root are refused.
    fn resolve(&self, path: &str) -> Result<PathBuf, ToolOutcome> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(ToolOutcome::error(format!(
                "absolute paths are not allowed: '{}'",
                path
            )));
        }

        let mut depth: i32 = 0;
        let mut resolved = self.root.clone();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => {
                    depth += 1;
                    resolved.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(ToolOutcome::error(format!(
                            "path '{}' escapes the workspace",
                            path
                        )));
                    }
                    resolved.pop();
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolOutcome::error(format!(
                        "absolute paths are not allowed: '{}'",
                        path
                    )));
                }
            }
        }
        Ok(resolved)
    }

    fn read_file(&self, call: &ToolCall) -> ToolOutcome {
        let path = match call.require_str("path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match std::fs::read_to_string(&resolved) {
            Ok(content) => ToolOutcome::success(content),
            Err(e) => ToolOutcome::error(format!("cannot read '{}': {}", path, e)),
        }
    }

    fn write_file(&self, call: &ToolCall) -> ToolOutcome {
        let (path, content) = match (call.require_str("path"), call.require_str("content")) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutcome::error(format!("cannot create parent of '{}': {}", path, e));
            }
        }
        match std::fs::write(&resolved, content) {
            Ok(()) => ToolOutcome::success(format!("wrote {} bytes to {}", content.len(), path)),
            Err(e) => ToolOutcome::error(format!("cannot write '{}': {}", path, e)),
        }
    }

    /// Exact-single-occurrence replacement. Zero matches and multiple
    /// matches both fail without touching the file; the exactness keeps the
    /// model from silently editing locations it has not looked at.
    fn edit_file(&self, call: &ToolCall) -> ToolOutcome {
        let path = match call.require_str("path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let target = match call.require_str("target") {
            Ok(t) => t,
            Err(e) => return e,
        };
        let replacement = call.get_str("replacement").unwrap_or_default();

        if target.is_empty() {
            return ToolOutcome::error("target must not be empty");
        }
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(format!("cannot read '{}': {}", path, e)),
        };

        match content.matches(target).count() {
            0 => ToolOutcome::error(format!("target not found in '{}'", path)),
            1 => {
                let updated = content.replacen(target, replacement, 1);
                match std::fs::write(&resolved, updated) {
                    Ok(()) => ToolOutcome::success(format!("edited {}", path)),
                    Err(e) => ToolOutcome::error(format!("cannot write '{}': {}", path, e)),
                }
            }
            n => ToolOutcome::error(format!(
                "target is ambiguous in '{}' ({} occurrences); include more surrounding context",
                path, n
            )),
        }
    }

    fn delete_file(&self, call: &ToolCall) -> ToolOutcome {
        let path = match call.require_str("path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match std::fs::remove_file(&resolved) {
            Ok(()) => ToolOutcome::success(format!("deleted {}", path)),
            Err(e) => ToolOutcome::error(format!("cannot delete '{}': {}", path, e)),
        }
    }

    fn list_directory(&self, call: &ToolCall) -> ToolOutcome {
        let path = call.get_str("path").unwrap_or(".");
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let entries = match std::fs::read_dir(&resolved) {
            Ok(rd) => rd,
            Err(e) => return ToolOutcome::error(format!("cannot list '{}': {}", path, e)),
        };

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == VCS_DIR {
                continue;
            }
            let suffix = match entry.file_type() {
                Ok(t) if t.is_dir() => "/",
                _ => "",
            };
            names.push(format!("{}{}", name, suffix));
        }
        names.sort();

        if names.is_empty() {
            ToolOutcome::success(format!("{} is empty", path))
        } else {
            ToolOutcome::success(names.join("\n"))
        }
    }

    fn get_file_info(&self, call: &ToolCall) -> ToolOutcome {
        let path = match call.require_str("path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let resolved = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(_) => {
                return ToolOutcome::success_with(json!({ "path": path, "exists": false }))
            }
        };

        let kind = if metadata.is_dir() { "directory" } else { "file" };
        let lines = if metadata.is_file() {
            std::fs::read(&resolved)
                .map(|bytes| bytes.iter().filter(|b| **b == b'\n').count())
                .ok()
        } else {
            None
        };

        ToolOutcome::success_with(json!({
            "path": path,
            "exists": true,
            "kind": kind,
            "size_bytes": metadata.len(),
            "line_count": lines,
        }))
    }

    async fn execute_command(&self, call: &ToolCall) -> ToolOutcome {
        let command = match call.require_str("command") {
            Ok(c) => c,
            Err(e) => return e,
        };
        self.run_shell(command).await
    }

    /// Run a shell command in the workspace. The executor adds nothing of
    /// its own, in particular it never issues version-control commands
    pub async fn run_shell(&self, command: &str) -> ToolOutcome {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => ToolOutcome::success_with(json!({
                "exit_code": output.status.code().unwrap_or(-1),
                "stdout": clip(&String::from_utf8_lossy(&output.stdout)),
                "stderr": clip(&String::from_utf8_lossy(&output.stderr)),
            })),
            Err(e) => ToolOutcome::error(format!("failed to run command: {}", e)),
        }
    }

    async fn search_files(&self, call: &ToolCall) -> ToolOutcome {
        let pattern = match call.require_str("pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let filter = call.get_str("file_filter");

        // ripgrep first, plain grep when it is not installed
        let mut rg_args = vec!["--line-number", "--no-heading"];
        if let Some(f) = filter {
            rg_args.extend(["-g", f]);
        }
        rg_args.extend(["-e", pattern, "."]);
        match self.run_search("rg", &rg_args).await {
            SearchResult::Done(outcome) => outcome,
            SearchResult::Unavailable => {
                let include;
                let mut grep_args = vec!["-rn", "--exclude-dir", VCS_DIR];
                if let Some(f) = filter {
                    include = format!("--include={}", f);
                    grep_args.push(&include);
                }
                grep_args.extend(["-e", pattern, "."]);
                match self.run_search("grep", &grep_args).await {
                    SearchResult::Done(outcome) => outcome,
                    SearchResult::Unavailable => {
                        ToolOutcome::error("neither rg nor grep is available")
                    }
                }
            }
        }
    }

    async fn find_files(&self, call: &ToolCall) -> ToolOutcome {
        let pattern = match call.require_str("pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };

        let glob = if pattern.contains('*') {
            pattern.to_string()
        } else {
            format!("*{}*", pattern)
        };

        match self.run_search("rg", &["--files", "-g", glob.as_str()]).await {
            SearchResult::Done(outcome) => outcome,
            SearchResult::Unavailable => {
                let find_args = [
                    ".",
                    "-name",
                    glob.as_str(),
                    "-not",
                    "-path",
                    "./.git/*",
                ];
                match self.run_search("find", &find_args).await {
                    SearchResult::Done(outcome) => outcome,
                    SearchResult::Unavailable => {
                        ToolOutcome::error("neither rg nor find is available")
                    }
                }
            }
        }
    }

    async fn run_search(&self, program: &str, args: &[&str]) -> SearchResult {
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SearchResult::Unavailable
            }
            Err(e) => {
                return SearchResult::Done(ToolOutcome::error(format!(
                    "failed to run {}: {}",
                    program, e
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        // exit code 1 means "no matches" for both rg and grep
        match output.status.code() {
            Some(0) => SearchResult::Done(ToolOutcome::success(clip(&stdout))),
            Some(1) if stdout.trim().is_empty() => {
                SearchResult::Done(ToolOutcome::success("no matches"))
            }
            _ => SearchResult::Done(ToolOutcome::error(format!(
                "{} failed: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    async fn view_diff(&self) -> ToolOutcome {
        // no commits yet means diff against the empty tree
        let has_head = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", "HEAD"])
            .current_dir(&self.root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        let base = if has_head { "HEAD" } else { EMPTY_TREE };
        let output = Command::new("git")
            .args(["diff", base])
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let diff = String::from_utf8_lossy(&output.stdout);
                if diff.trim().is_empty() {
                    ToolOutcome::success("no uncommitted changes")
                } else {
                    ToolOutcome::success(clip(&diff))
                }
            }
            Ok(output) => ToolOutcome::error(format!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => ToolOutcome::error(format!("failed to run git: {}", e)),
        }
    }
}

enum SearchResult {
    Done(ToolOutcome),
    Unavailable,
}

fn clip(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT {
        return s.to_string();
    }
    let mut end = OUTPUT_LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (output truncated)", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor() -> (TempDir, ToolExecutor) {
        let dir = TempDir::new().expect("tempdir");
        let executor = ToolExecutor::new(dir.path());
        (dir, executor)
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall::new("c1", name, input)
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (_dir, ex) = executor();
        let response = ex
            .execute(&call(
                "write_file",
                json!({ "path": "deep/nested/file.txt", "content": "hello" }),
            ))
            .await;
        assert!(response.outcome.ok, "{:?}", response.outcome);

        let response = ex
            .execute(&call("read_file", json!({ "path": "deep/nested/file.txt" })))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.render(), "hello");
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_workspace() {
        let (_dir, ex) = executor();
        for path in ["../outside.txt", "a/../../outside.txt", "/etc/passwd"] {
            let response = ex
                .execute(&call("read_file", json!({ "path": path })))
                .await;
            assert!(!response.outcome.ok, "path '{}' was allowed", path);
        }
        // a dotdot that stays inside is fine
        std::fs::write(ex.root().join("ok.txt"), "inside").unwrap();
        let response = ex
            .execute(&call("read_file", json!({ "path": "sub/../ok.txt" })))
            .await;
        assert!(response.outcome.ok);
    }

    #[tokio::test]
    async fn edit_file_requires_exactly_one_match() {
        let (_dir, ex) = executor();
        std::fs::write(ex.root().join("f.txt"), "aaa bbb aaa").unwrap();

        // ambiguous: two occurrences, file untouched
        let response = ex
            .execute(&call(
                "edit_file",
                json!({ "path": "f.txt", "target": "aaa", "replacement": "x" }),
            ))
            .await;
        assert!(!response.outcome.ok);
        assert!(response.outcome.payload["error"]
            .as_str()
            .unwrap()
            .contains("ambiguous"));
        assert_eq!(
            std::fs::read_to_string(ex.root().join("f.txt")).unwrap(),
            "aaa bbb aaa"
        );

        // not found
        let response = ex
            .execute(&call(
                "edit_file",
                json!({ "path": "f.txt", "target": "zzz", "replacement": "x" }),
            ))
            .await;
        assert!(!response.outcome.ok);
        assert!(response.outcome.payload["error"]
            .as_str()
            .unwrap()
            .contains("not found"));

        // single match replaces
        let response = ex
            .execute(&call(
                "edit_file",
                json!({ "path": "f.txt", "target": "bbb", "replacement": "ccc" }),
            ))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(
            std::fs::read_to_string(ex.root().join("f.txt")).unwrap(),
            "aaa ccc aaa"
        );
    }

    #[tokio::test]
    async fn empty_replacement_deletes_target() {
        let (_dir, ex) = executor();
        std::fs::write(ex.root().join("f.txt"), "keep REMOVE keep").unwrap();
        let response = ex
            .execute(&call(
                "edit_file",
                json!({ "path": "f.txt", "target": " REMOVE", "replacement": "" }),
            ))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(
            std::fs::read_to_string(ex.root().join("f.txt")).unwrap(),
            "keep keep"
        );
    }

    #[tokio::test]
    async fn listing_is_sorted_and_hides_the_vcs_dir() {
        let (_dir, ex) = executor();
        std::fs::create_dir(ex.root().join(".git")).unwrap();
        std::fs::create_dir(ex.root().join("src")).unwrap();
        std::fs::write(ex.root().join("b.txt"), "").unwrap();
        std::fs::write(ex.root().join("a.txt"), "").unwrap();

        let response = ex.execute(&call("list_directory", json!({}))).await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.render(), "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn file_info_reports_size_and_lines() {
        let (_dir, ex) = executor();
        std::fs::write(ex.root().join("f.txt"), "one\ntwo\n").unwrap();

        let response = ex
            .execute(&call("get_file_info", json!({ "path": "f.txt" })))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.payload["exists"], true);
        assert_eq!(response.outcome.payload["kind"], "file");
        assert_eq!(response.outcome.payload["size_bytes"], 8);
        assert_eq!(response.outcome.payload["line_count"], 2);

        let response = ex
            .execute(&call("get_file_info", json!({ "path": "missing.txt" })))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.payload["exists"], false);
    }

    #[tokio::test]
    async fn commands_capture_streams_and_exit_code() {
        let (_dir, ex) = executor();
        let response = ex
            .execute(&call(
                "execute_command",
                json!({ "command": "echo out; echo err >&2; exit 3" }),
            ))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.payload["exit_code"], 3);
        assert_eq!(response.outcome.payload["stdout"], "out\n");
        assert_eq!(response.outcome.payload["stderr"], "err\n");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_structured_error() {
        let (_dir, ex) = executor();
        let response = ex.execute(&call("teleport", json!({}))).await;
        assert!(!response.outcome.ok);
        assert_eq!(response.call_id, "c1");
    }

    #[tokio::test]
    async fn search_finds_content() {
        let (_dir, ex) = executor();
        std::fs::write(ex.root().join("code.rs"), "fn needle() {}\n").unwrap();
        std::fs::write(ex.root().join("other.txt"), "nothing here\n").unwrap();

        let response = ex
            .execute(&call("search_files", json!({ "pattern": "needle" })))
            .await;
        assert!(response.outcome.ok, "{:?}", response.outcome);
        assert!(response.outcome.render().contains("code.rs"));

        let response = ex
            .execute(&call("search_files", json!({ "pattern": "no_such_thing" })))
            .await;
        assert!(response.outcome.ok);
        assert_eq!(response.outcome.render(), "no matches");
    }
}
