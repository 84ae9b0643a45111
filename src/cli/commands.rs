//! CLI command handlers
//!
//! Thin wrappers: parse arguments, call into the pipeline or the ledger,
//! print results. All the behavior lives below this layer.

use std::sync::Arc;

use crate::cli::{Cli, Command};
use crate::core::Config;
use crate::hosting::{ChangeRequestHost, GitHubHost};
use crate::ledger::LedgerStore;
use crate::pipeline::Pipeline;
use crate::provider::create_provider;
use crate::request::{Autonomy, Request};

/// Dispatch one parsed invocation
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Register {
            name,
            remote,
            branch,
            autonomy,
            test_command,
        } => {
            let autonomy = autonomy
                .map(|a| a.parse::<Autonomy>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let pipeline = build_pipeline(config)?;
            let project =
                pipeline.register_project(&name, &remote, &branch, autonomy, test_command)?;
            println!(
                "Registered project '{}' ({}, autonomy: {})",
                project.name, project.remote_url, project.autonomy
            );
        }

        Command::New {
            project,
            description,
        } => {
            let pipeline = build_pipeline(config)?;
            let request = pipeline.ingest(&project, &description).await?;
            print_request(&request);
        }

        Command::Run { id, force } => {
            let pipeline = build_pipeline(config)?;
            let request = pipeline.execute(&id, force).await?;
            print_request(&request);
        }

        Command::Amend { id, text } => {
            let pipeline = build_pipeline(config)?;
            let request = pipeline.amend(&id, &text).await?;
            print_request(&request);
        }

        Command::Apply { id } => {
            let pipeline = build_pipeline(config)?;
            let request = pipeline.apply(&id)?;
            print_request(&request);
        }

        Command::List => {
            let store = LedgerStore::open(&config.ledger)?;
            let requests = store.list_requests()?;
            if requests.is_empty() {
                println!("No requests yet.");
            }
            for request in requests {
                println!(
                    "{:<8} {:<12} {:<10} {}",
                    request.id,
                    request.status,
                    request.project,
                    first_line(&request.description)
                );
            }
        }

        Command::Show { id } => {
            let store = LedgerStore::open(&config.ledger)?;
            let request = store.load_request(&id)?;
            print_request(&request);

            println!("\nSpecs:");
            for spec in &request.specs {
                println!("  v{} ({}): {}", spec.version, spec.created_at, first_line(&spec.text));
            }
            println!("\nAttempts:");
            for attempt in &request.attempts {
                println!(
                    "  #{} (spec v{}): {:?}{}{}",
                    attempt.id,
                    attempt.spec_version,
                    attempt.outcome,
                    attempt
                        .commit
                        .as_deref()
                        .map(|c| format!(" commit {}", &c[..c.len().min(10)]))
                        .unwrap_or_default(),
                    attempt
                        .failure_reason
                        .as_deref()
                        .map(|r| format!(" ({})", first_line(r)))
                        .unwrap_or_default(),
                );
            }
            println!("\nHistory:");
            for event in store.load_events(&id)? {
                println!("  {} {}", event.at, event.kind.slug());
            }
        }
    }
    Ok(())
}

fn build_pipeline(config: Config) -> anyhow::Result<Pipeline> {
    config.validate()?;
    let provider = create_provider(&config)?;
    // hosting is optional; execution fails later only if a PR is actually needed
    let host: Option<Arc<dyn ChangeRequestHost>> = match GitHubHost::from_config(&config.hosting) {
        Ok(host) => Some(Arc::new(host)),
        Err(_) => None,
    };
    Ok(Pipeline::new(config, provider, host)?)
}

fn print_request(request: &Request) {
    println!(
        "{} [{}] {} (branch {})",
        request.id, request.status, request.project, request.branch
    );
    if let Some(url) = &request.pr_url {
        println!("  PR: {}", url);
    }
    if let Some(attempt) = request.attempts.last() {
        if let Some(summary) = &attempt.summary {
            println!("  {}", first_line(summary));
        }
        if let Some(reason) = &attempt.failure_reason {
            println!("  failure: {}", first_line(reason));
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
