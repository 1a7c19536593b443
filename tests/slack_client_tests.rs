//! Slack Web API client tests against a mock server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use slack_agent::error::{BotError, ErrorCategory};
use slack_agent::slack::{HistoryLimits, SlackClient};

fn client(server: &MockServer) -> SlackClient {
    SlackClient::new("xoxb-test")
        .with_app_token("xapp-test")
        .with_api_base(server.uri())
        .with_history_limits(HistoryLimits {
            page_size: 2,
            max_messages: 100,
            page_delay: Duration::ZERO,
            crawl_budget: Duration::from_secs(5),
        })
}

fn ok(mut body: serde_json::Value) -> ResponseTemplate {
    body["ok"] = json!(true);
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn post_message_threads_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_json(json!({
            "channel": "C1",
            "text": "4",
            "thread_ts": "1700000000.000100"
        })))
        .respond_with(ok(json!({ "channel": "C1", "ts": "1700000001.000200" })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client(&server)
        .post_message("C1", "4", Some("1700000000.000100"))
        .await
        .unwrap();

    assert_eq!(ack.channel_id, "C1");
    assert_eq!(ack.message_ts, "1700000001.000200");
}

#[tokio::test]
async fn auth_test_returns_bot_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ok(json!({ "user_id": "UBOT", "user": "agent", "team_id": "T1" })))
        .mount(&server)
        .await;

    let auth = client(&server).auth_test().await.unwrap();

    assert_eq!(auth.user_id, "UBOT");
    assert_eq!(auth.team_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn invalid_token_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "invalid_auth"
        })))
        .mount(&server)
        .await;

    let err = client(&server).auth_test().await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Authentication);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn failed_post_is_a_retryable_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "channel_not_found"
        })))
        .mount(&server)
        .await;

    let err = client(&server).post_message("C404", "hi", None).await.unwrap_err();

    assert!(matches!(err, BotError::Transport { .. }));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("channel_not_found"));
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client(&server).post_message("C1", "hi", None).await.unwrap_err();

    assert_eq!(err.retry_after_ms(), Some(7000));
}

#[tokio::test]
async fn socket_connection_uses_app_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps.connections.open"))
        .and(header("authorization", "Bearer xapp-test"))
        .respond_with(ok(json!({ "url": "wss://wss.example/link" })))
        .mount(&server)
        .await;

    let url = client(&server).open_socket_connection().await.unwrap();
    assert_eq!(url, "wss://wss.example/link");

    let without_app_token = SlackClient::new("xoxb-test").with_api_base(server.uri());
    let err = without_app_token.open_socket_connection().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[tokio::test]
async fn user_names_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U1"))
        .respond_with(ok(json!({ "user": { "name": "ada", "real_name": "Ada Lovelace" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "user_not_found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);

    assert_eq!(client.user_name("U1").await, "Ada Lovelace");
    assert_eq!(client.user_name("U1").await, "Ada Lovelace");
    assert_eq!(client.user_name("U404").await, "Unknown User (U404)");
    assert_eq!(client.user_name("U404").await, "Unknown User (U404)");
    assert_eq!(client.user_name("").await, "Unknown User");
    assert_eq!(client.user_name("B123").await, "B123");
}

#[tokio::test]
async fn history_pages_are_filtered_and_returned_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .and(query_param("channel", "C1"))
        .and(query_param("limit", "2"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ok(json!({
            "messages": [
                { "user": "U1", "text": "deploy finished", "ts": "1700000004.000000" },
                { "user": "U1", "text": "", "ts": "1700000003.000000" }
            ],
            "has_more": true,
            "response_metadata": { "next_cursor": "page2" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .and(query_param("cursor", "page2"))
        .respond_with(ok(json!({
            "messages": [
                { "user": "U2", "text": "<@U2> has joined", "ts": "1700000002.000000", "subtype": "channel_join" },
                { "user": "U2", "text": "starting the deploy", "ts": "1700000001.000000" }
            ],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U1"))
        .respond_with(ok(json!({ "user": { "name": "ada" } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U2"))
        .respond_with(ok(json!({ "user": { "name": "grace", "profile": { "real_name": "Grace Hopper" } } })))
        .mount(&server)
        .await;

    let messages = client(&server).fetch_channel_history("C1").await.unwrap();

    let summary: Vec<_> = messages
        .iter()
        .map(|m| (m.user_name.as_str(), m.ts.as_str(), m.text.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Grace Hopper", "1700000001.000000", "starting the deploy"),
            ("ada", "1700000004.000000", "deploy finished"),
        ]
    );
}

#[tokio::test]
async fn history_stops_at_message_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(ok(json!({
            "messages": [
                { "user": "B1", "text": "newest", "ts": "3" },
                { "user": "B1", "text": "middle", "ts": "2" }
            ],
            "has_more": true,
            "response_metadata": { "next_cursor": "more" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SlackClient::new("xoxb-test")
        .with_api_base(server.uri())
        .with_history_limits(HistoryLimits {
            page_size: 2,
            max_messages: 1,
            page_delay: Duration::ZERO,
            crawl_budget: Duration::from_secs(5),
        });
    let messages = client.fetch_channel_history("C1").await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "newest");
}

#[tokio::test]
async fn crawl_budget_returns_newest_pages_of_an_endless_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(ok(json!({
            "messages": [
                { "user": "B1", "text": "newer", "ts": "2" },
                { "user": "B1", "text": "older", "ts": "1" }
            ],
            "has_more": true,
            "response_metadata": { "next_cursor": "again" }
        })))
        .mount(&server)
        .await;

    let client = SlackClient::new("xoxb-test")
        .with_api_base(server.uri())
        .with_history_limits(HistoryLimits {
            page_size: 2,
            max_messages: 10_000,
            page_delay: Duration::from_millis(100),
            crawl_budget: Duration::from_millis(250),
        });
    let started = std::time::Instant::now();

    let messages = client.fetch_channel_history("C1").await.unwrap();

    let pages = server.received_requests().await.unwrap().len();
    assert!((2..=4).contains(&pages), "fetched {pages} pages");
    assert_eq!(messages.len(), pages * 2);
    assert_eq!(messages.last().unwrap().text, "newer");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn absurd_retry_after_saturates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", u64::MAX.to_string().as_str()))
        .mount(&server)
        .await;

    let err = client(&server).post_message("C1", "hi", None).await.unwrap_err();

    assert_eq!(err.retry_after_ms(), Some(u64::MAX));
}
