//! Core types, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ProviderKind};
pub use error::{ForemanError, Result};
pub use types::{ParsedResponse, ToolCall, ToolDefinition, ToolOutcome, ToolResponse};
