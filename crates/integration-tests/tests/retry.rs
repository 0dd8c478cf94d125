mod harness;

use axum::http::StatusCode;
use harness::config::ConfigBuilder;
use harness::mock_llm::{MOCK_REPLY, MockLlm};
use harness::server::TestServer;
use serde_json::{Value, json};

fn completion_body(text: &str) -> Value {
    json!({
        "chat_completion_source": "openai",
        "messages": [{"role": "user", "content": text}]
    })
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let mock = MockLlm::start_failing(1, StatusCode::SERVICE_UNAVAILABLE).await.unwrap();
    let config = ConfigBuilder::new().with_openai(&mock.openai_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("Hello")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-parley-upstream-attempts"], "2");

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["choices"][0]["message"]["content"], MOCK_REPLY);
    assert_eq!(mock.completion_count(), 2);
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let mock = MockLlm::start_failing(2, StatusCode::TOO_MANY_REQUESTS).await.unwrap();
    let config = ConfigBuilder::new().with_openai(&mock.openai_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("Hello")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(mock.completion_count(), 3);
}

#[tokio::test]
async fn persistent_failure_surfaces_as_bad_gateway() {
    let mock = MockLlm::start_failing(u32::MAX, StatusCode::INTERNAL_SERVER_ERROR).await.unwrap();
    let config = ConfigBuilder::new().with_openai(&mock.openai_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("Hello")).send().await.unwrap();

    assert_eq!(resp.status(), 502);
    assert_eq!(resp.headers()["x-parley-upstream-attempts"], "3");

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "upstream_error");
    assert_eq!(json["error"]["upstream_status"], 500);
    assert!(json["error"]["detail"].as_str().unwrap().contains("intentional failure"));

    // One attempt plus the default two retries
    assert_eq!(mock.completion_count(), 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let mock = MockLlm::start_failing(u32::MAX, StatusCode::BAD_REQUEST).await.unwrap();
    let config = ConfigBuilder::new().with_openai(&mock.openai_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("Hello")).send().await.unwrap();

    assert_eq!(resp.status(), 502);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["upstream_status"], 400);
    assert_eq!(mock.completion_count(), 1);
}

#[tokio::test]
async fn retry_ceiling_is_configurable() {
    let mock = MockLlm::start_failing(u32::MAX, StatusCode::BAD_GATEWAY).await.unwrap();
    let config = ConfigBuilder::new()
        .with_openai(&mock.openai_url())
        .with_max_retries(0)
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("Hello")).send().await.unwrap();

    assert_eq!(resp.status(), 502);
    assert_eq!(mock.completion_count(), 1);
}

#[tokio::test]
async fn arithmetic_is_answered_when_upstream_fails() {
    let mock = MockLlm::start_failing(u32::MAX, StatusCode::INTERNAL_SERVER_ERROR).await.unwrap();
    let config = ConfigBuilder::new()
        .with_openai(&mock.openai_url())
        .with_chat(|chat| chat.math_short_circuit = false)
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.generate(&completion_body("What is 12*3?")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-parley-fallback-reason"], "local_arithmetic");

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["choices"][0]["message"]["content"], "36");
    assert_eq!(mock.completion_count(), 3);
}
