use openai_exam::app::config::{AssistantConfig, CompletionConfig};
use openai_exam::{
    AppConfig, AssistantSession, CompletionClient, CostCalculator, ExamError, OpenAiClient,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new("sk-test", &server.uri(), Duration::from_secs(5)).unwrap()
}

fn completion_client(server: &MockServer) -> CompletionClient {
    CompletionClient::new(
        Box::new(client_for(server)),
        Arc::new(CostCalculator::new()),
        CompletionConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_completion_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo",
            "response_format": { "type": "json_object" },
            "max_tokens": 4095,
            "messages": [
                { "role": "system", "content": "You are a helpful assistant designed to output JSON." },
                { "role": "user", "content": "Who won the world series in 2020?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-3.5-turbo-0125",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"winner\": \"Los Angeles Dodgers\"}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 1000, "completion_tokens": 1000, "total_tokens": 2000 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = completion_client(&server)
        .complete(
            "You are a helpful assistant designed to output JSON.",
            "Who won the world series in 2020?",
        )
        .await
        .unwrap();

    assert_eq!(completion.json().unwrap()["winner"], "Los Angeles Dodgers");
    assert_eq!(completion.cost.input_cost, dec!(0.005));
    assert_eq!(completion.cost.output_cost, dec!(0.015));
    assert_eq!(completion.cost.total_cost, dec!(0.020));
}

#[tokio::test]
async fn test_completion_upstream_failure_is_typed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {
                "message": "The server had an error while processing your request.",
                "type": "server_error",
                "code": null
            }
        })))
        .mount(&server)
        .await;

    let err = completion_client(&server)
        .complete("sys", "user")
        .await
        .unwrap_err();

    match err {
        ExamError::UpstreamRequest { status, message } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "The server had an error while processing your request.");
        }
        other => panic!("expected UpstreamRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_garbage_body_is_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = completion_client(&server)
        .complete("sys", "user")
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::UpstreamRequest { status: Some(200), .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_upstream_error() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let client = CompletionClient::new(
        Box::new(OpenAiClient::new("sk-test", &uri, Duration::from_secs(2)).unwrap()),
        Arc::new(CostCalculator::new()),
        CompletionConfig::default(),
    )
    .unwrap();

    let err = client.complete("sys", "user").await.unwrap_err();
    assert!(matches!(err, ExamError::UpstreamRequest { status: None, .. }));
}

#[tokio::test]
async fn test_assistant_session_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/assistants"))
        .and(header("openai-beta", "assistants=v2"))
        .and(body_partial_json(json!({
            "model": "gpt-4-turbo-preview",
            "name": "General Assistant",
            "tools": [{ "type": "code_interpreter" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "asst_abc", "object": "assistant", "model": "gpt-4-turbo-preview", "name": "General Assistant"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_abc", "object": "thread" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_abc/messages"))
        .and(body_partial_json(json!({ "role": "user", "content": "What is 2 + 2?" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_user_1",
            "object": "thread.message",
            "role": "user",
            "content": [{ "type": "text", "text": { "value": "What is 2 + 2?", "annotations": [] } }],
            "created_at": 1700000000
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/threads/thread_abc/runs"))
        .and(body_partial_json(json!({ "assistant_id": "asst_abc" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1", "thread_id": "thread_abc", "assistant_id": "asst_abc",
            "status": "queued", "model": "gpt-4-turbo-preview", "usage": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_abc/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1", "thread_id": "thread_abc", "assistant_id": "asst_abc",
            "status": "completed", "model": "gpt-4-turbo-preview",
            "usage": { "prompt_tokens": 500, "completion_tokens": 100, "total_tokens": 600 }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/threads/thread_abc/messages"))
        .and(query_param("order", "asc"))
        .and(query_param("after", "msg_user_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{
                "id": "msg_asst_1",
                "object": "thread.message",
                "role": "assistant",
                "run_id": "run_1",
                "content": [{ "type": "text", "text": { "value": "2 + 2 = 4", "annotations": [] } }],
                "created_at": 1700000005
            }],
            "first_id": "msg_asst_1",
            "last_id": "msg_asst_1",
            "has_more": false
        })))
        .mount(&server)
        .await;

    let settings = AssistantConfig {
        poll_interval_ms: 10,
        ..AssistantConfig::default()
    };
    let mut session = AssistantSession::create(
        Box::new(client_for(&server)),
        Arc::new(CostCalculator::new()),
        settings,
    )
    .await
    .unwrap();

    let mut output: Vec<u8> = Vec::new();
    let summary = session
        .run_interactive("What is 2 + 2?\nquit\n".as_bytes(), &mut output)
        .await
        .unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(output.contains("Assistant: 2 + 2 = 4"));
    assert!(output.contains("Input cost for GPT-4 Turbo Preview: $0.005"));
    assert!(output.contains("Output cost for GPT-4 Turbo Preview: $0.003"));
    assert_eq!(summary.turns, 1);
    assert_eq!(summary.token_cost.total_cost, dec!(0.008));
}

#[tokio::test]
async fn test_missing_credential_fails_before_network() {
    let server = MockServer::start().await;
    let mut config = AppConfig::default();
    config.base_url = server.uri();

    assert!(matches!(
        OpenAiClient::from_config(&config),
        Err(ExamError::MissingConfiguration(_))
    ));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_timed_out_run_is_cancelled() {
    let server = MockServer::start().await;
    let run = |status: &str| {
        json!({
            "id": "run_slow", "thread_id": "thread_abc", "assistant_id": "asst_abc",
            "status": status, "model": "gpt-4-turbo-preview", "usage": null
        })
    };

    Mock::given(method("POST"))
        .and(path("/assistants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "asst_abc", "model": "gpt-4-turbo-preview" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_abc" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_abc/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_user_1", "role": "user", "content": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_abc/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("queued")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_abc/runs/run_slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("in_progress")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_abc/runs/run_slow/cancel"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run("cancelling")))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = AssistantSession::create(
        Box::new(client_for(&server)),
        Arc::new(CostCalculator::new()),
        AssistantConfig::default(),
    )
    .await
    .unwrap()
    .with_polling(Duration::from_millis(10), Duration::from_millis(50));

    let err = session.send("slow question").await.unwrap_err();
    assert!(matches!(err, ExamError::RunTimeout { ref run_id, .. } if run_id == "run_slow"));
    assert_eq!(session.summary().turns, 0);
}
