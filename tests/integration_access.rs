//! Access-request integration tests
//!
//! GitHub is replaced by a wiremock server answering account lookups,
//! open-issue listings and issue creation.

mod common;

use common::*;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn github_mock(open_issues: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/org/auth/issues"))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(open_issues))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/org/auth/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "html_url": "https://github.com/org/auth/issues/7",
            "number": 7
        })))
        .mount(&server)
        .await;
    // Any other account exists
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "someone"})))
        .mount(&server)
        .await;
    server
}

fn request_body(login: &str, email: &str) -> serde_json::Value {
    json!({
        "name": "Ada",
        "surname": "Lovelace",
        "email": email,
        "github_username": login
    })
}

async fn submit(
    client: &reqwest::Client,
    addr: std::net::SocketAddr,
    body: &serde_json::Value,
) -> reqwest::Response {
    client
        .post(format!("http://{}/access/request", addr))
        .json(body)
        .send()
        .await
        .unwrap()
}

/// Test 1: accepted request is logged and a tracking issue is opened
#[tokio::test]
async fn test_request_accepted_with_issue() {
    let github = github_mock(json!([])).await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, Some(&github.uri()));
    config.access.github_token = Some("ghp_issue".to_string());
    let state = create_test_state(config);
    let log_path = state.access.log().path().to_path_buf();
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, addr, &request_body("adal", "ada@example.org")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt: serde_json::Value = response.json().await.unwrap();
    assert_eq!(receipt["accepted"], true);
    assert_eq!(receipt["github_issue_created"], true);
    assert_eq!(receipt["github_issue_number"], 7);
    assert_eq!(
        receipt["github_issue_url"],
        "https://github.com/org/auth/issues/7"
    );

    let contents = std::fs::read_to_string(log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["github_username"], "adal");
    assert_eq!(record["remote_addr"], "127.0.0.1");
}

/// Test 2: without an issue token the request is still accepted
#[tokio::test]
async fn test_request_accepted_without_issue_token() {
    let github = github_mock(json!([])).await;
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(&dir, Some(&github.uri())));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, addr, &request_body("adal", "ada@example.org")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt: serde_json::Value = response.json().await.unwrap();
    assert_eq!(receipt["accepted"], true);
    assert_eq!(receipt["github_issue_created"], false);
    assert_eq!(receipt["github_issue_error"], "missing token");
}

/// Test 3: second request for the same login conflicts, case-insensitively
#[tokio::test]
async fn test_duplicate_request_conflicts() {
    let github = github_mock(json!([])).await;
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(&dir, Some(&github.uri())));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let first = submit(&client, addr, &request_body("adal", "ada@example.org")).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = submit(&client, addr, &request_body("AdaL", "augusta@example.org")).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

/// Test 4: unknown GitHub account is rejected
#[tokio::test]
async fn test_unknown_github_user_rejected() {
    let github = github_mock(json!([])).await;
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(&dir, Some(&github.uri())));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, addr, &request_body("ghost", "ghost@example.org")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "GitHub user not found");
}

/// Test 5: an open tracking issue for the login counts as a duplicate
#[tokio::test]
async fn test_open_issue_counts_as_duplicate() {
    let github = github_mock(json!([
        {"title": "Access request: Ada Lovelace (AdaL)"}
    ]))
    .await;
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(&dir, Some(&github.uri())));
    let log_path = state.access.log().path().to_path_buf();
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, addr, &request_body("adal", "ada@example.org")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let contents = std::fs::read_to_string(log_path).unwrap_or_default();
    assert!(contents.is_empty());
}

/// Test 6: the request log survives a restart
#[tokio::test]
async fn test_log_persists_across_restart() {
    let dir = TempDir::new().unwrap();

    {
        let state = create_test_state(create_test_config(&dir, None));
        let (addr, shutdown) = run_test_server(state).await;
        let client = reqwest::Client::new();
        let response = submit(&client, addr, &request_body("adal", "ada@example.org")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let _ = shutdown.send(());
    }

    let state = create_test_state(create_test_config(&dir, None));
    assert!(state.access.log().contains("ADAL"));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, addr, &request_body("adal", "other@example.org")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// Test 7: repeated submissions from one email are throttled
#[tokio::test]
async fn test_email_throttle() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, None);
    config.access.max_per_email = 2;
    let (addr, _shutdown) = run_test_server(create_test_state(config)).await;
    let client = reqwest::Client::new();

    for login in ["first-user", "second-user"] {
        let response = submit(&client, addr, &request_body(login, "Ada@Example.org")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = submit(&client, addr, &request_body("third-user", "ada@example.org")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

/// Test 8: malformed and oversized bodies are bad requests
#[tokio::test]
async fn test_malformed_bodies_rejected() {
    let dir = TempDir::new().unwrap();
    let state = create_test_state(create_test_config(&dir, None));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/access/request", addr))
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("http://{}/access/request", addr))
        .body("x".repeat(4096))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
