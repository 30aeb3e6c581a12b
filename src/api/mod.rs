pub mod client;
pub mod openai;
pub mod types;

pub use client::{AssistantApi, ChatApi};
pub use openai::OpenAiClient;
