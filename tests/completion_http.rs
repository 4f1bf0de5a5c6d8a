use std::time::Duration;

use serde_json::json;
use talkreel::{
    CompletionClient, CompletionConfig, ConversationTurn, OpenAiCompletionClient, RetryPolicy,
    TalkreelError,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, retry: RetryPolicy) -> OpenAiCompletionClient {
    OpenAiCompletionClient::new(
        CompletionConfig {
            base_url: format!("{}/api/v1", server.uri()),
            api_key: "test-key".into(),
            model: "test-model".into(),
            temperature: 0.7,
            timeout: Duration::from_secs(5),
        },
        retry,
    )
    .unwrap()
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

fn hello() -> Vec<ConversationTurn> {
    vec![ConversationTurn::user("Hello")]
}

#[tokio::test]
async fn rate_limited_twice_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(reply("  Hi there!  "))
        .expect(1)
        .mount(&server)
        .await;

    let out = client(&server, RetryPolicy::immediate(3))
        .complete(&hello(), 100)
        .await
        .unwrap();
    assert_eq!(out, "Hi there!");
}

#[tokio::test]
async fn default_policy_backs_off_one_then_two_seconds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let out = client(&server, RetryPolicy::default())
        .complete(&hello(), 100)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(out, "ok");
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, RetryPolicy::immediate(3))
        .complete(&hello(), 100)
        .await
        .unwrap_err();
    match err {
        TalkreelError::Backend { status, body } => {
            assert_eq!(status, Some(400));
            assert_eq!(body, "bad model");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn persistent_server_errors_exhaust_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, RetryPolicy::immediate(3))
        .complete(&hello(), 100)
        .await
        .unwrap_err();
    assert!(matches!(err, TalkreelError::Backend { status: Some(503), .. }));
}

#[tokio::test]
async fn missing_content_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, RetryPolicy::immediate(3))
        .complete(&hello(), 100)
        .await
        .unwrap_err();
    assert!(matches!(err, TalkreelError::Backend { .. }));
}
