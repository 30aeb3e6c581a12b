// ABOUTME: Centralized error handling for the application
// Provides consistent error types and conversions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExamError {
    #[error("Unknown model '{0}': no pricing entry for this model")]
    UnknownModel(String),

    #[error("Upstream request failed{}: {message}", status_suffix(.status))]
    UpstreamRequest {
        status: Option<u16>,
        message: String,
    },

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run {run_id} ended with status '{status}': {message}")]
    RunFailed {
        run_id: String,
        status: String,
        message: String,
    },

    #[error("Run {run_id} did not finish within {waited_secs}s")]
    RunTimeout { run_id: String, waited_secs: u64 },

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl From<reqwest::Error> for ExamError {
    fn from(err: reqwest::Error) -> Self {
        ExamError::UpstreamRequest {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl ExamError {
    pub fn upstream(message: impl Into<String>) -> Self {
        ExamError::UpstreamRequest {
            status: None,
            message: message.into(),
        }
    }

    /// Errors that end a single chat turn but leave the session usable
    pub fn is_turn_error(&self) -> bool {
        matches!(
            self,
            ExamError::UpstreamRequest { .. }
                | ExamError::RunFailed { .. }
                | ExamError::RunTimeout { .. }
                | ExamError::UnknownModel(_)
                | ExamError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExamError>;
