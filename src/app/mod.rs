pub mod config;
pub mod state;

pub use config::{AppConfig, AssistantConfig, CompletionConfig};
pub use state::{is_exit_command, SessionState};
