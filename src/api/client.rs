// ABOUTME: Trait seams over the remote chat and assistants APIs
// The clients depend only on these traits, so tests and other back ends can stand in

use crate::api::types::{
    Assistant, ChatCompletionRequest, ChatCompletionResponse, CreateAssistantRequest,
    CreateMessageRequest, CreateRunRequest, ListMessagesQuery, MessageList, Run, Thread,
    ThreadMessage,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Single-shot chat completion endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse>;
}

/// Assistant, thread, message and run endpoints.
///
/// Implementations are stateless; all conversation state lives on the remote
/// thread and is addressed by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_assistant(&self, request: &CreateAssistantRequest) -> Result<Assistant>;

    async fn create_thread(&self) -> Result<Thread>;

    /// Append a message to the thread
    async fn create_message(
        &self,
        thread_id: &str,
        request: &CreateMessageRequest,
    ) -> Result<ThreadMessage>;

    /// Start a run of the assistant over the current thread contents
    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Ask the server to stop a run that is still queued or in progress
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// One page of thread messages
    async fn list_messages(&self, thread_id: &str, query: &ListMessagesQuery)
        -> Result<MessageList>;
}
