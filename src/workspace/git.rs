//! Workspace git collaborator
//!
//! One on-disk working copy per project, exclusively owned by the single
//! in-flight request execution targeting it. The engine only needs a
//! handful of operations, so this stays a small explicit wrapper around
//! `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument};

use crate::core::{ForemanError, Result};
use crate::request::Project;

/// A prepared working copy of a project's repository
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
    default_branch: String,
}

impl Workspace {
    /// Clone the project, or refresh an existing clone by fetching and
    /// hard-resetting to the remote default branch
    #[instrument(skip_all, fields(project = %project.name))]
    pub fn prepare(root: &Path, project: &Project) -> Result<Self> {
        let path = root.join(&project.name);
        let workspace = Self {
            path: path.clone(),
            default_branch: project.default_branch.clone(),
        };

        if path.join(".git").exists() {
            debug!(path = %path.display(), "refreshing existing clone");
            workspace.run_checked(&["fetch", "origin"])?;
            workspace.run_checked(&["checkout", &project.default_branch])?;
            workspace.run_checked(&[
                "reset",
                "--hard",
                &format!("origin/{}", project.default_branch),
            ])?;
            workspace.run_checked(&["clean", "-fd"])?;
        } else {
            std::fs::create_dir_all(root)?;
            debug!(url = %project.remote_url, path = %path.display(), "cloning");
            let output = Command::new("git")
                .args(["clone", &project.remote_url])
                .arg(&path)
                .output()
                .map_err(|e| ForemanError::workspace(format!("spawn git clone: {}", e)))?;
            if !output.status.success() {
                return Err(ForemanError::workspace(format!(
                    "git clone failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }

        // commits need an identity regardless of the host environment
        workspace.run_checked(&["config", "user.name", "foreman"])?;
        workspace.run_checked(&["config", "user.email", "foreman@localhost"])?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out the request branch, continuing prior work when it exists.
    /// `discard_existing` deletes the old branch first for a clean rebuild.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str, discard_existing: bool) -> Result<()> {
        let exists = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", branch),
            ])?
            .status
            .success();

        if exists && discard_existing {
            debug!(branch, "discarding existing branch for forced rebuild");
            self.run_checked(&["checkout", &self.default_branch])?;
            self.run_checked(&["branch", "-D", branch])?;
            self.run_checked(&["checkout", "-b", branch])?;
        } else if exists {
            self.run_checked(&["checkout", branch])?;
        } else {
            self.run_checked(&["checkout", "-b", branch])?;
        }
        Ok(())
    }

    /// Stage and commit everything; Ok(false) when there was nothing to commit
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.run_checked(&["add", "-A"])?;
        let staged = !String::from_utf8_lossy(
            &self.run(&["diff", "--cached", "--name-only"])?.stdout,
        )
        .trim()
        .is_empty();
        if !staged {
            debug!("nothing to commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    /// Push the branch; forced, since foreman owns its request branches
    pub fn push(&self, branch: &str) -> Result<()> {
        self.run_checked(&["push", "--force", "origin", branch])?;
        Ok(())
    }

    /// Current commit reference
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_checked(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForemanError::workspace(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .map_err(|e| ForemanError::workspace(format!("spawn git {}: {}", args.join(" "), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::request::{Autonomy, SCHEMA_VERSION};

    /// Bare "remote" seeded with one commit, plus a project pointing at it
    fn seeded_remote(dir: &Path) -> Project {
        let remote = dir.join("remote.git");
        let seed = dir.join("seed");
        run(dir, &["init", "--quiet", "--bare", "-b", "main", "remote.git"]);
        run(dir, &["init", "--quiet", "-b", "main", "seed"]);
        run(&seed, &["config", "user.name", "t"]);
        run(&seed, &["config", "user.email", "t@t"]);
        std::fs::write(seed.join("README.md"), "# seed\n").unwrap();
        run(&seed, &["add", "-A"]);
        run(&seed, &["commit", "--quiet", "-m", "init"]);
        run(
            &seed,
            &["push", "--quiet", remote.to_str().unwrap(), "main"],
        );

        Project {
            schema_version: SCHEMA_VERSION,
            name: "demo".to_string(),
            remote_url: remote.to_string_lossy().into_owned(),
            default_branch: "main".to_string(),
            autonomy: Autonomy::ExecuteLocal,
            registered_at: Utc::now(),
            test_command: None,
        }
    }

    fn run(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("spawn git");
        assert!(
            out.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    #[test]
    fn prepare_clones_then_refreshes() {
        let dir = TempDir::new().unwrap();
        let project = seeded_remote(dir.path());
        let root = dir.path().join("workspaces");

        let ws = Workspace::prepare(&root, &project).unwrap();
        assert!(ws.path().join("README.md").exists());

        // second prepare takes the fetch-and-reset path and drops local noise
        std::fs::write(ws.path().join("stray.txt"), "x").unwrap();
        let ws = Workspace::prepare(&root, &project).unwrap();
        assert!(!ws.path().join("stray.txt").exists());
    }

    #[test]
    fn branch_commit_push_round_trip() {
        let dir = TempDir::new().unwrap();
        let project = seeded_remote(dir.path());
        let root = dir.path().join("workspaces");

        let ws = Workspace::prepare(&root, &project).unwrap();
        ws.checkout_branch("foreman/req-1", false).unwrap();

        // nothing staged yet
        assert!(!ws.commit_all("noop").unwrap());

        std::fs::write(ws.path().join("new.txt"), "content").unwrap();
        assert!(ws.commit_all("add new.txt").unwrap());
        assert_eq!(ws.head_sha().unwrap().len(), 40);

        ws.push("foreman/req-1").unwrap();

        // re-checkout continues the branch; forced discard rebuilds from main
        ws.checkout_branch("foreman/req-1", false).unwrap();
        assert!(ws.path().join("new.txt").exists());
        ws.checkout_branch("foreman/req-1", true).unwrap();
        assert!(!ws.path().join("new.txt").exists());
    }
}
