//! Configuration for the agent.
//!
//! Values come from CLI flags with environment fallbacks:
//! - `OPENAI_API_KEY` - Required in live mode. Key for the reasoning model API.
//!
//! Simulated mode needs no credentials and never touches the network.

use std::path::PathBuf;
use thiserror::Error;

/// Primary steps allowed per run before the loop gives up.
pub const DEFAULT_MAX_STEPS: u32 = 8;

/// Reflection events allowed per run.
pub const DEFAULT_MAX_REFLECTIONS: u32 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Run mode label recorded in run logs (e.g. "enhanced")
    pub mode: String,

    /// Reasoning model identifier
    pub model: String,

    /// API key for the live model; falls back to `OPENAI_API_KEY`
    pub api_key: Option<String>,

    /// Offline mode: deterministic simulated model, no network
    pub simulate: bool,

    /// Maximum primary steps per run
    pub max_steps: u32,

    /// Maximum reflection events per run
    pub max_reflections: u32,

    /// Directory that task data files are resolved against
    pub base_dir: PathBuf,

    /// Path of the persistent rule store
    pub bank_path: PathBuf,

    /// Directory that run records are written under
    pub runs_dir: PathBuf,
}

impl AgentConfig {
    /// Create a config with the default step and reflection budgets.
    pub fn new(model: impl Into<String>, simulate: bool, bank_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: "enhanced".to_string(),
            model: model.into(),
            api_key: None,
            simulate,
            max_steps: DEFAULT_MAX_STEPS,
            max_reflections: DEFAULT_MAX_REFLECTIONS,
            base_dir: PathBuf::from("."),
            bank_path: bank_path.into(),
            runs_dir: PathBuf::from("runs"),
        }
    }

    /// Resolve the live-model API key from the explicit setting or the
    /// `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither source provides a key.
    /// Callers check this at construction time, before any run begins.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }
}
