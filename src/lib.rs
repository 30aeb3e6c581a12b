// ABOUTME: Main library module that exports the public API
// Completion and assistant-session clients for the OpenAI API, plus cost estimation

pub mod api;
pub mod app;
pub mod chat;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use api::{AssistantApi, ChatApi, OpenAiClient};
pub use app::{AppConfig, SessionState};
pub use chat::{AssistantSession, Completion, CompletionClient, SessionSummary, Turn};
pub use utils::{CostBreakdown, CostCalculator, ExamError, ModelPricing, Result, TokenUsage, ToolCost};
