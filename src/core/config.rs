//! Configuration management for Foreman
//!
//! Supports environment variables, config files, and runtime overrides.
//! The loaded `Config` is passed into constructors (provider, ledger,
//! pipeline); nothing reads process-wide mutable state after startup.
//!
//! Config file location: ~/.config/foreman/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{ForemanError, Result};
use crate::request::Autonomy;

/// Main configuration for Foreman
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model backend configuration
    pub provider: ProviderConfig,
    /// Outbound HTTP retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Request lifecycle policy
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Ledger storage configuration
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Workspace storage configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Pull-request hosting configuration
    #[serde(default)]
    pub hosting: HostingConfig,
}

/// Which model backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Anthropic messages API (content blocks, native call ids)
    Anthropic,
    /// OpenAI chat completions API
    OpenAi,
    /// Local Ollama server (call ids synthesized)
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend selection, fixed at startup
    pub kind: ProviderKind,
    /// Model identifier passed to the backend
    pub model: String,
    /// API credential; read once, immutable for the process lifetime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override the backend base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Bounded retry/backoff configuration for outbound HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff
    pub base_delay_secs: f64,
    /// Cap applied to every computed or server-hinted delay
    pub max_delay_secs: f64,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum conversation turns before the attempt fails
    pub max_turns: usize,
    /// Extra system prompt text appended to the built-in instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Request lifecycle policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Failed attempts (across the whole request) before escalating to a human
    pub max_failed_attempts: u32,
    /// Autonomy applied to projects registered without an explicit level
    pub default_autonomy: Autonomy,
}

/// Ledger storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Root directory of the ledger git repository
    pub root: PathBuf,
}

/// Workspace storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory under which per-project clones live
    pub root: PathBuf,
}

/// Pull-request hosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// API token for the hosting service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// REST API base URL
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            agent: AgentConfig::default(),
            policy: PolicyConfig::default(),
            ledger: LedgerConfig::default(),
            workspace: WorkspaceConfig::default(),
            hosting: HostingConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let kind = match env::var("FOREMAN_PROVIDER").as_deref() {
            Ok("openai") => ProviderKind::OpenAi,
            Ok("ollama") => ProviderKind::Ollama,
            _ => ProviderKind::Anthropic,
        };
        let api_key = env::var("FOREMAN_API_KEY")
            .or_else(|_| match kind {
                ProviderKind::Anthropic => env::var("ANTHROPIC_API_KEY"),
                ProviderKind::OpenAi => env::var("OPENAI_API_KEY"),
                ProviderKind::Ollama => Err(env::VarError::NotPresent),
            })
            .ok();
        Self {
            kind,
            model: env::var("FOREMAN_MODEL").unwrap_or_else(|_| default_model(kind).to_string()),
            api_key,
            base_url: env::var("FOREMAN_BASE_URL").ok(),
            timeout_secs: 300,
        }
    }
}

fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Anthropic => "claude-sonnet-4-5",
        ProviderKind::OpenAi => "gpt-4o",
        ProviderKind::Ollama => "qwen3:8b",
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            system_prompt: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 2,
            default_autonomy: Autonomy::DraftPr,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("ledger"),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("workspaces"),
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            token: env::var("GITHUB_TOKEN").ok(),
            api_base: "https://api.github.com".to_string(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("foreman")
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("foreman")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: env vars > config file > defaults
    pub fn load() -> Self {
        // Pick up a .env file if one exists
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(ForemanError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ForemanError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ForemanError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| ForemanError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ForemanError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| ForemanError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Validate the parts of the config the selected backend requires
    pub fn validate(&self) -> Result<()> {
        if self.provider.kind != ProviderKind::Ollama && self.provider.api_key.is_none() {
            return Err(ForemanError::config(format!(
                "provider '{}' requires an api_key (or FOREMAN_API_KEY)",
                self.provider.kind
            )));
        }
        if self.policy.max_failed_attempts == 0 {
            return Err(ForemanError::config(
                "policy.max_failed_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_secs, 1.0);
        assert_eq!(config.retry.max_delay_secs, 60.0);
        assert_eq!(config.agent.max_turns, 50);
        assert_eq!(config.policy.max_failed_attempts, 2);
        assert_eq!(config.policy.default_autonomy, Autonomy::DraftPr);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("max_turns"));
        assert!(toml_str.contains("max_failed_attempts"));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("foreman"));
    }

    #[test]
    fn test_validate_rejects_zero_failure_budget() {
        let mut config = Config::default();
        config.provider.api_key = Some("k".into());
        config.policy.max_failed_attempts = 0;
        assert!(config.validate().is_err());
    }
}
