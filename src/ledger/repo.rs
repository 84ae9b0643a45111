//! Git plumbing for the ledger tree
//!
//! The ledger mutates by whole-tree add-then-commit, one commit per logical
//! mutation, which keeps the full history inspectable with plain git. A
//! small explicit wrapper around `git` subprocess calls is all that needs.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::core::{ForemanError, Result};

/// Wrapper for executing git commands in the ledger directory
#[derive(Debug, Clone)]
pub struct LedgerRepo {
    workdir: PathBuf,
}

impl LedgerRepo {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Initialize the repository on first use; committing needs an identity,
    /// so a local one is pinned at init time
    pub fn init_if_needed(&self) -> Result<()> {
        if self.workdir.join(".git").exists() {
            return Ok(());
        }
        debug!(path = %self.workdir.display(), "initializing ledger repository");
        self.run_checked(&["init", "--quiet"])?;
        self.run_checked(&["config", "user.name", "foreman"])?;
        self.run_checked(&["config", "user.email", "foreman@localhost"])?;
        Ok(())
    }

    /// Stage all changes
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit
    pub fn has_staged_changes(&self) -> Result<bool> {
        // diff against HEAD covers the very first commit too
        let head = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !head.status.success() {
            let out = self.run(&["diff", "--cached", "--name-only"])?;
            return Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty());
        }
        let out = self.run(&["diff", "--cached", "--name-only", "HEAD"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// Returns Ok(false) without committing when nothing is staged, so
    /// no-op mutations leave no empty commits behind.
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!(message, "committing ledger mutation");
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    /// Stage everything and commit in one step
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.add_all()?;
        self.commit_staged(message)
    }

    /// Number of commits on HEAD (0 before the first commit)
    pub fn commit_count(&self) -> Result<u64> {
        let out = self.run(&["rev-list", "--count", "HEAD"])?;
        if !out.status.success() {
            return Ok(0);
        }
        String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse()
            .map_err(|e| ForemanError::ledger(format!("unparseable commit count: {}", e)))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForemanError::ledger(format!(
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
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| ForemanError::ledger(format!("spawn git {}: {}", args.join(" "), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_is_idempotent_and_noop_commits_are_skipped() {
        let dir = TempDir::new().unwrap();
        let repo = LedgerRepo::new(dir.path());
        repo.init_if_needed().unwrap();
        repo.init_if_needed().unwrap();

        // nothing to commit yet
        assert!(!repo.commit_all("empty").unwrap());
        assert_eq!(repo.commit_count().unwrap(), 0);

        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        assert!(repo.commit_all("first").unwrap());
        assert_eq!(repo.commit_count().unwrap(), 1);

        // unchanged tree commits nothing
        assert!(!repo.commit_all("again").unwrap());
        assert_eq!(repo.commit_count().unwrap(), 1);
    }
}
