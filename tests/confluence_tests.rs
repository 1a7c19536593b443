//! Confluence document search against a mock Confluence server.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::quick_retry;
use slack_agent::confluence::ConfluenceClient;
use slack_agent::error::{BotError, ErrorCategory};
use slack_agent::tools::{ConfluenceSearchTool, DocumentSource, ToolRegistry};

const RUNBOOK_URL: &str = "https://wiki.example/spaces/OPS/pages/123/Release+Runbook";

fn page_body(title: &str, storage: &str) -> serde_json::Value {
    json!({
        "id": "123",
        "type": "page",
        "title": title,
        "body": { "storage": { "value": storage, "representation": "storage" } },
        "version": { "number": 7 },
        "space": { "key": "OPS" }
    })
}

fn registry(server: &MockServer, page_urls: Vec<String>) -> ToolRegistry {
    let client = ConfluenceClient::new(server.uri(), "pat-test", page_urls);
    ToolRegistry::builder()
        .retry(quick_retry(2))
        .register(Arc::new(ConfluenceSearchTool::new(Arc::new(client))))
        .build()
        .unwrap()
}

#[tokio::test]
async fn search_loads_pages_once_and_links_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/123"))
        .and(query_param("expand", "body.storage,version,space,history"))
        .and(header("authorization", "Bearer pat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            "Release Runbook",
            "<h2>Cutting a release</h2><p>Releases are cut every <strong>Thursday</strong> &amp; tagged.</p>",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/456"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let registry = registry(
        &server,
        vec![
            RUNBOOK_URL.to_string(),
            "https://wiki.example/spaces/OPS/pages/456/Gone".to_string(),
            "https://wiki.example/display/OPS/No+Id".to_string(),
        ],
    );

    let first = registry
        .invoke("confluence_document_search", json!({ "query": "when is a release cut?" }))
        .await
        .unwrap();
    let second = registry
        .invoke("confluence_document_search", json!({ "query": "payroll" }))
        .await
        .unwrap();

    assert_eq!(
        first,
        json!(format!(
            "Found relevant information in Confluence documentation:\n\n\
             Source Document: <{RUNBOOK_URL}|Release Runbook>\n\
             Relevant Content: ...Cutting a release Releases are cut every Thursday & tagged...."
        ))
    );
    assert_eq!(
        second,
        json!("No relevant information found in the indexed Confluence documents for query: 'payroll'")
    );
}

#[tokio::test]
async fn rejected_token_is_a_permanent_tool_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/123"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = registry(&server, vec![RUNBOOK_URL.to_string()])
        .invoke("confluence_document_search", json!({ "query": "release" }))
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::ToolExecution { transient: false, .. }));
    assert_eq!(err.category(), ErrorCategory::ToolExecution);
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/123"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let err = registry(&server, vec![RUNBOOK_URL.to_string()])
        .invoke("confluence_document_search", json!({ "query": "release" }))
        .await
        .unwrap_err();

    match err {
        BotError::ToolExecution { message, transient, .. } => {
            assert!(transient);
            assert!(message.contains("HTTP 503"));
        }
        other => panic!("expected tool execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn pages_without_storage_body_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "123", "title": "Empty" })))
        .mount(&server)
        .await;

    let client = ConfluenceClient::new(server.uri(), "pat-test", vec![RUNBOOK_URL.to_string()]);
    let pages = client.load_pages().await.unwrap();

    assert!(pages.is_empty());
}
