//! testdeck Common Library
//!
//! Shared types, errors, and the result-store layout for the testdeck
//! orchestration and reporting pipeline.

pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use store::{ResultStore, ARTIFACT_FILE, HISTORY_FILE, REPORT_FILE};
pub use types::*;

/// testdeck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".testdeck")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
