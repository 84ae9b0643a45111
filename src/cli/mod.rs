//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

/// Foreman - autonomous coding-agent orchestrator
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a project (target repository)
    Register {
        /// Project name (unique key)
        name: String,
        /// Clone URL of the repository
        remote: String,
        /// Default branch pull requests target
        #[arg(long, default_value = "main")]
        branch: String,
        /// Autonomy level: ingest_only, execute_local, draft_pr, full
        #[arg(long)]
        autonomy: Option<String>,
        /// Command run in the workspace after each successful attempt
        #[arg(long)]
        test_command: Option<String>,
    },

    /// Create a request and (autonomy permitting) execute it
    New {
        /// Project the request belongs to
        project: String,
        /// What should be done
        description: String,
    },

    /// Execute a request (retry a failed one, or rebuild with --force)
    Run {
        /// Request identifier, e.g. REQ-3
        id: String,
        /// Discard prior workspace state and rebuild the branch
        #[arg(long)]
        force: bool,
    },

    /// Append a follow-up spec revision to a finished request and re-execute
    Amend {
        /// Request identifier
        id: String,
        /// The follow-up description
        text: String,
    },

    /// Mark a succeeded request as applied
    Apply {
        /// Request identifier
        id: String,
    },

    /// List all requests
    List,

    /// Show one request with its event history
    Show {
        /// Request identifier
        id: String,
    },
}
