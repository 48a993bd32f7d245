//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Result store directory path
    pub store_root: PathBuf,

    /// Root of the project holding the test files
    pub project_root: PathBuf,

    /// Web listen address
    pub listen: String,

    /// Test engine configuration
    pub engine: EngineConfig,

    /// Discovery configuration
    pub discovery: DiscoveryConfig,

    /// How many entries the slowest-tests ranking keeps
    pub slowest_limit: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            store_root: testdeck_common::default_store_path(),
            project_root: PathBuf::from("."),
            listen: "127.0.0.1:8080".to_string(),
            engine: EngineConfig::default(),
            discovery: DiscoveryConfig::default(),
            slowest_limit: 10,
        }
    }
}

/// Test engine command template.
///
/// `{file}`, `{filter}` and `{output}` placeholders are substituted per
/// invocation, so any engine that can run one file with a name filter and
/// emit a JSON artifact can be driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Program to invoke
    pub program: String,

    /// Argument template
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec![
                "jest".to_string(),
                "--runTestsByPath".to_string(),
                "{file}".to_string(),
                "--testNamePattern".to_string(),
                "{filter}".to_string(),
                "--json".to_string(),
                "--outputFile".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

/// Test-file discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// File name suffixes that mark a test file
    pub test_file_suffixes: Vec<String>,

    /// Directory names excluded from the walk (the store root is always
    /// excluded)
    pub exclude_dirs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            test_file_suffixes: vec![".test.js".to_string(), ".spec.js".to_string()],
            exclude_dirs: vec!["node_modules".to_string(), ".git".to_string()],
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
