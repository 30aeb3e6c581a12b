// ABOUTME: Single-turn completion client with forced JSON output
// Sends one system+user pair, prices the exchange and hands back the reply text

use crate::api::client::ChatApi;
use crate::api::types::{ChatCompletionRequest, ChatMessage, ResponseFormat};
use crate::app::config::CompletionConfig;
use crate::utils::cost_calculator::{CostBreakdown, CostCalculator, TokenUsage};
use crate::utils::error::{ExamError, Result};
use std::sync::Arc;

/// Reply from one completion call
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Model id the server reports, which may be a dated snapshot
    pub served_model: String,
    pub usage: TokenUsage,
    pub cost: CostBreakdown,
}

impl Completion {
    /// Parse the reply as JSON. Nothing guarantees the model honoured JSON mode.
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

pub struct CompletionClient {
    api: Box<dyn ChatApi>,
    calculator: Arc<CostCalculator>,
    settings: CompletionConfig,
}

impl CompletionClient {
    /// Fails with UnknownModel before any request if the model cannot be priced
    pub fn new(
        api: Box<dyn ChatApi>,
        calculator: Arc<CostCalculator>,
        settings: CompletionConfig,
    ) -> Result<Self> {
        calculator.pricing(&settings.model)?;
        Ok(Self {
            api,
            calculator,
            settings,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn build_request(&self, system_prompt: &str, user_prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature: Some(self.settings.temperature),
            top_p: Some(self.settings.top_p),
            frequency_penalty: Some(self.settings.frequency_penalty),
            presence_penalty: Some(self.settings.presence_penalty),
            max_tokens: Some(self.settings.max_tokens),
            response_format: self.settings.json_mode.then_some(ResponseFormat::JsonObject),
        }
    }

    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        let request = self.build_request(system_prompt, user_prompt);
        let response = self.api.create_chat_completion(&request).await?;

        let usage = response
            .usage
            .ok_or_else(|| ExamError::upstream("response did not include token usage"))?;
        let cost = self.calculator.estimate_usage(&self.settings.model, &usage)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExamError::upstream("response contained no choices"))?
            .message
            .content
            .ok_or_else(|| ExamError::upstream("first choice has no text content"))?;

        tracing::info!(
            model = %self.settings.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_cost = %cost.total_cost,
            "completion finished"
        );

        Ok(Completion {
            content,
            served_model: response.model,
            usage,
            cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::MockChatApi;
    use crate::api::types::{ChatChoice, ChatCompletionResponse, ChoiceMessage, Role};
    use rust_decimal_macros::dec;

    fn response(content: Option<&str>, usage: Option<TokenUsage>) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-1".to_string(),
            model: "gpt-3.5-turbo-0125".to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: content.map(str::to_string),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }

    fn client(api: MockChatApi) -> CompletionClient {
        CompletionClient::new(
            Box::new(api),
            Arc::new(CostCalculator::new()),
            CompletionConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_text_and_cost() {
        let mut api = MockChatApi::new();
        api.expect_create_chat_completion()
            .withf(|req| {
                req.model == "gpt-3.5-turbo"
                    && req.messages.len() == 2
                    && req.messages[0].role == Role::System
                    && req.messages[1].content == "Who won the world series in 2020?"
                    && req.response_format == Some(ResponseFormat::JsonObject)
                    && req.max_tokens == Some(4095)
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    Some(r#"{"winner": "Los Angeles Dodgers"}"#),
                    Some(TokenUsage::new(1000, 1000)),
                ))
            });

        let completion = client(api)
            .complete(
                "You are a helpful assistant designed to output JSON.",
                "Who won the world series in 2020?",
            )
            .await
            .unwrap();

        assert_eq!(completion.json().unwrap()["winner"], "Los Angeles Dodgers");
        assert_eq!(completion.served_model, "gpt-3.5-turbo-0125");
        assert_eq!(completion.cost.total_cost, dec!(0.020));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_swallowed() {
        let mut api = MockChatApi::new();
        api.expect_create_chat_completion().returning(|_| {
            Err(ExamError::UpstreamRequest {
                status: Some(500),
                message: "server exploded".to_string(),
            })
        });

        let err = client(api).complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ExamError::UpstreamRequest { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mut api = MockChatApi::new();
        api.expect_create_chat_completion().returning(|_| {
            let mut empty = response(None, Some(TokenUsage::new(5, 0)));
            empty.choices.clear();
            Ok(empty)
        });

        let err = client(api).complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ExamError::UpstreamRequest { .. }));
    }

    #[tokio::test]
    async fn test_missing_usage_is_an_error() {
        let mut api = MockChatApi::new();
        api.expect_create_chat_completion()
            .returning(|_| Ok(response(Some("{}"), None)));

        let err = client(api).complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ExamError::UpstreamRequest { .. }));
    }

    #[test]
    fn test_unknown_model_fails_before_any_request() {
        // No expectations: any call on the mock would panic
        let api = MockChatApi::new();
        let settings = CompletionConfig {
            model: "gpt-unknown".to_string(),
            ..CompletionConfig::default()
        };

        let result = CompletionClient::new(Box::new(api), Arc::new(CostCalculator::new()), settings);
        assert!(matches!(result, Err(ExamError::UnknownModel(m)) if m == "gpt-unknown"));
    }

    #[test]
    fn test_json_mode_can_be_disabled() {
        let settings = CompletionConfig {
            json_mode: false,
            ..CompletionConfig::default()
        };
        let client =
            CompletionClient::new(Box::new(MockChatApi::new()), Arc::new(CostCalculator::new()), settings)
                .unwrap();

        assert_eq!(client.build_request("s", "u").response_format, None);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_returned_verbatim() {
        let mut api = MockChatApi::new();
        api.expect_create_chat_completion()
            .returning(|_| Ok(response(Some("not json"), Some(TokenUsage::new(10, 2)))));

        let completion = client(api).complete("sys", "user").await.unwrap();
        assert_eq!(completion.content, "not json");
        assert!(matches!(completion.json(), Err(ExamError::Json(_))));
    }
}
