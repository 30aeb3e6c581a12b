// ABOUTME: Application configuration with defaults and file loading
// Supports TOML configuration files, a .env file and environment variables

use crate::api::types::ToolKind;
use crate::utils::error::{ExamError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_COMPLETION_MODEL: &str = "OPENAI_EXAM_COMPLETION_MODEL";
pub const ENV_ASSISTANT_MODEL: &str = "OPENAI_EXAM_ASSISTANT_MODEL";
pub const ENV_PRICING_FILE: &str = "OPENAI_EXAM_PRICING_FILE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_file: Option<PathBuf>,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    #[serde(skip)]
    pub debug: bool,
}

/// Sampling parameters for single-turn completions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub model: String,
    pub name: String,
    pub instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_instructions: Option<String>,
    pub tools: Vec<ToolKind>,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    /// Reprint every assistant message in the thread on each turn
    pub replay_history: bool,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: 4095,
            json_mode: true,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            name: "General Assistant".to_string(),
            instructions: "You are a versatile assistant. Answer questions to the best of your knowledge and run code if necessary.".to_string(),
            run_instructions: Some(
                "Please address the user appropriately. They have a premium account.".to_string(),
            ),
            tools: vec![ToolKind::CodeInterpreter],
            poll_interval_ms: 1000,
            poll_timeout_secs: 120,
            replay_history: false,
        }
    }
}

impl AssistantConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            pricing_file: None,
            completion: CompletionConfig::default(),
            assistant: AssistantConfig::default(),
            api_key: None,
            config_path: None,
            debug: false,
        }
    }
}

impl AppConfig {
    /// Location of config.toml in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "openai-exam", "openai-exam")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from an explicit file, which must exist, or the default location
    /// when present, then apply the process environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_path() {
                Some(default_path) if default_path.exists() => Self::read_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExamError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Override with environment variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api_key = Some(key);
        }

        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = url;
        }

        if let Some(model) = non_empty(ENV_COMPLETION_MODEL) {
            self.completion.model = model;
        }

        if let Some(model) = non_empty(ENV_ASSISTANT_MODEL) {
            self.assistant.model = model;
        }

        if let Some(path) = non_empty(ENV_PRICING_FILE) {
            self.pricing_file = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ExamError::Config("base_url must not be empty".to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(ExamError::Config("timeout_seconds must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ExamError::Config(format!(
                "completion.temperature {} is outside 0..=2",
                self.completion.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.completion.top_p) {
            return Err(ExamError::Config(format!(
                "completion.top_p {} is outside 0..=1",
                self.completion.top_p
            )));
        }
        if self.assistant.poll_interval_ms == 0 {
            return Err(ExamError::Config(
                "assistant.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.assistant.poll_timeout() < self.assistant.poll_interval() {
            return Err(ExamError::Config(
                "assistant.poll_timeout_secs must be at least one poll interval".to_string(),
            ));
        }
        Ok(())
    }

    /// The API credential; required before any network client is built
    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ExamError::MissingConfiguration(format!(
                "{} is not set; export it or add it to a .env file",
                ENV_API_KEY
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
