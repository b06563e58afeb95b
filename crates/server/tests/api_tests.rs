//! Router tests: Torznab dispatch, thread expansion, health, config, metrics
//! and API key protection.

mod common;

use axum::http::StatusCode;

use common::{TestConfig, TestFixture};

#[tokio::test]
async fn test_caps() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api?t=caps").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.content_type.starts_with("application/xml"));
    assert!(response.body.contains("<caps>"));
    assert!(response.body.contains("<tv-search available=\"yes\""));
    // caps never touches the forum
    assert!(fixture.transport.requests().await.is_empty());
}

#[tokio::test]
async fn test_tvsearch_returns_feed_for_requested_episode() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get("/api?t=tvsearch&q=Dark&season=1&ep=2&cat=5000,5030")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = &response.body;
    assert!(body.contains("<rss version=\"2.0\""));
    assert_eq!(body.matches("<item>").count(), 2, "{}", body);
    assert!(body.contains("forumdex-10-1-2-"));
    assert!(body.contains("forumdex-10-1-0-"));
    assert!(!body.contains("forumdex-10-1-1-"));
    assert!(body.contains("magnet:?xt=urn:btih:a2"));

    // season 2 thread is dropped by title before expansion
    assert_eq!(fixture.transport.get_count("/viewtopic.php?t=20").await, 0);
    assert_eq!(fixture.transport.post_count("/ucp.php").await, 1);
    assert_eq!(fixture.store.save_count(), 1);
}

#[tokio::test]
async fn test_search_without_query_returns_empty_feed() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api?t=search").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<channel>"));
    assert!(!response.body.contains("<item>"));
    assert_eq!(fixture.transport.get_count("/search.php").await, 0);
}

#[tokio::test]
async fn test_search_honours_limit() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api?t=search&q=Dark&limit=1").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.matches("<item>").count(), 1);
}

#[tokio::test]
async fn test_unknown_function_is_torznab_error() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api?t=music").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<error code=\"100\""));
    assert!(response.body.contains("Unknown function: music"));

    let response = fixture.get("/api").await;
    assert!(response.body.contains("Missing parameter: t"));
}

#[tokio::test]
async fn test_test_function_logs_in() {
    let fixture = TestFixture::new().await;

    let health = fixture.get("/health").await.json();
    assert_eq!(health["authentication"], "not_authenticated");

    let response = fixture.get("/api?t=test").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<channel>"));

    let health = fixture.get("/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["authentication"], "authenticated");
    assert!(health["last_login"].is_string());
}

#[tokio::test]
async fn test_test_function_reports_forum_outage() {
    let fixture = TestFixture::with_config(TestConfig::forum_down()).await;

    let response = fixture.get("/api?t=test").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<error code=\"100\""));
    assert!(response.body.contains("Forum login failed"));
}

#[tokio::test]
async fn test_thread_releases() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/threads/10/releases").await;
    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["thread_id"], "10");
    assert_eq!(json["total"], 3);

    let json = fixture
        .get("/api/v1/threads/10/releases?season=1&episode=1")
        .await
        .json();
    let releases = json["releases"].as_array().unwrap();
    assert_eq!(releases.len(), 2);
    assert_eq!(releases[0]["episode"], 1);
    assert_eq!(releases[1]["is_season_pack"], true);
}

#[tokio::test]
async fn test_thread_releases_rejects_bad_id() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/threads/abc/releases").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(fixture.transport.requests().await.is_empty());
}

#[tokio::test]
async fn test_thread_releases_when_forum_is_down() {
    let fixture = TestFixture::with_config(TestConfig::forum_down()).await;

    let response = fixture.get("/api/v1/threads/10/releases").await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.json()["error"].is_string());
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.body.contains("hunter2"));
    assert!(response.body.contains("forum.example.org"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/health").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("forumdex_http_requests_total"));
    assert!(response.body.contains("forumdex_forum_authenticated"));
}

#[tokio::test]
async fn test_api_key_protects_api_but_not_health() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key("secret-key")).await;

    let response = fixture.get("/api?t=caps").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body.contains("<error code=\"100\""));

    let response = fixture.get("/api?t=caps&apikey=secret-key").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<caps>"));

    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = fixture.get_with_key("/api/v1/config", "secret-key").await;
    assert_eq!(response.status, StatusCode::OK);

    let response = fixture.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
}
