//! Configuration management for weft
//!
//! Repository-level settings are loaded from `.weft/config.toml` and feed
//! the scheduler, verification loop, and model selection defaults. CLI
//! flags override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Repository-level weft configuration
///
/// Loaded from `.weft/config.toml` in the repo root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    /// Scheduler defaults
    #[serde(default)]
    pub scheduler: SchedulerDefaults,

    /// Verification loop defaults
    #[serde(default)]
    pub verification: VerificationDefaults,

    /// Model selection
    #[serde(default)]
    pub model: ModelDefaults,

    /// Directory holding checkpoint documents
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

/// Default scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerDefaults {
    /// Maximum tasks executing at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts per task before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-task timeout in milliseconds
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Verification loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDefaults {
    /// Generate-test-fix cycles per task
    #[serde(default = "default_verify_retries")]
    pub max_retries: u32,

    /// Extensions treated as verifiable source
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    /// Default model identifier
    #[serde(default = "default_model")]
    pub default: String,

    /// Sampling temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

// Default value providers
fn default_state_dir() -> String {
    ".weft/state".to_string()
}

fn default_max_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_verify_retries() -> u32 {
    3
}

fn default_source_extensions() -> Vec<String> {
    vec![
        "ts".to_string(),
        "tsx".to_string(),
        "js".to_string(),
        "jsx".to_string(),
        "mjs".to_string(),
        "cjs".to_string(),
    ]
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

impl WeftConfig {
    /// Load configuration from `.weft/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".weft/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::WeftError::Config(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.weft/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(".weft");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| crate::WeftError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerDefaults::default(),
            verification: VerificationDefaults::default(),
            model: ModelDefaults::default(),
            state_dir: default_state_dir(),
        }
    }
}

impl Default for SchedulerDefaults {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            task_timeout_ms: default_task_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for VerificationDefaults {
    fn default() -> Self {
        Self {
            max_retries: default_verify_retries(),
            source_extensions: default_source_extensions(),
        }
    }
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            default: default_model(),
            temperature: default_temperature(),
        }
    }
}
