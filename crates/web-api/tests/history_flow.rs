mod support;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use support::TestServer;

#[tokio::test]
async fn health_check_is_ok() {
    let server = TestServer::start().await;
    let response = Client::new()
        .get(server.http("/health"))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_ids_return_empty_lists() {
    let server = TestServer::start().await;
    let client = Client::new();

    for path in ["/api/conversations/nobody", "/api/messages/no_chat"] {
        let response = client.get(server.http(path)).send().await.expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        let body: Vec<Value> = response.json().await.expect("json");
        assert!(body.is_empty(), "{path} should be empty");
    }
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let server = TestServer::start().await;
    let too_long = "x".repeat(1100);

    let response = Client::new()
        .get(server.http(&format!("/api/messages/{too_long}")))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let response = Client::new()
        .get(server.http("/api/messages/a_b?after=minus-one"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_is_open_by_default() {
    let server = TestServer::start().await;
    let response = Client::new()
        .get(server.http("/health"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .expect("request");
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
