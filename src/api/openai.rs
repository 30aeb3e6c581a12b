// ABOUTME: reqwest-backed implementation of the chat and assistants API traits
// Maps non-2xx responses and transport failures to ExamError::UpstreamRequest

use crate::api::client::{AssistantApi, ChatApi};
use crate::api::types::{
    ApiErrorBody, Assistant, ChatCompletionRequest, ChatCompletionResponse,
    CreateAssistantRequest, CreateMessageRequest, CreateRunRequest, ListMessagesQuery,
    MessageList, Run, Thread, ThreadMessage,
};
use crate::app::config::AppConfig;
use crate::utils::error::{ExamError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ExamError::MissingConfiguration(
                "API key must not be empty".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExamError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from config; fails with MissingConfiguration when no key is set
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.api_key()?, &config.base_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, beta: bool) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let mut builder = self.authorized(self.http.post(&url)).json(body);
        if beta {
            builder = builder.header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1);
        }

        let response = builder.send().await?;
        Self::decode(response).await
    }

    async fn get_json<Q, R>(&self, path: &str, query: Option<&Q>) -> Result<R>
    where
        Q: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let mut builder = self
            .authorized(self.http.get(&url))
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1);
        if let Some(query) = query {
            builder = builder.query(query);
        }

        let response = builder.send().await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| {
                    if body.is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        body
                    }
                });
            tracing::warn!(status = status.as_u16(), %message, "upstream returned an error");
            return Err(ExamError::UpstreamRequest {
                status: Some(status.as_u16()),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ExamError::UpstreamRequest {
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {}", e),
        })
    }
}

#[async_trait]
impl ChatApi for OpenAiClient {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.post_json("chat/completions", request, false).await
    }
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn create_assistant(&self, request: &CreateAssistantRequest) -> Result<Assistant> {
        self.post_json("assistants", request, true).await
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.post_json("threads", &serde_json::json!({}), true).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        request: &CreateMessageRequest,
    ) -> Result<ThreadMessage> {
        self.post_json(&format!("threads/{}/messages", thread_id), request, true)
            .await
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Run> {
        self.post_json(&format!("threads/{}/runs", thread_id), request, true)
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get_json::<(), _>(&format!("threads/{}/runs/{}", thread_id, run_id), None)
            .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.post_json(
            &format!("threads/{}/runs/{}/cancel", thread_id, run_id),
            &serde_json::json!({}),
            true,
        )
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        query: &ListMessagesQuery,
    ) -> Result<MessageList> {
        self.get_json(&format!("threads/{}/messages", thread_id), Some(query))
            .await
    }
}
