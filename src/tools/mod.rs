//! Sandboxed workspace tools

pub mod catalog;
pub mod executor;

pub use catalog::{catalog, FINISH_TOOL};
pub use executor::ToolExecutor;
