//! Common test utilities for router tests.
//!
//! Builds the full router over a scripted in-memory forum, so requests run
//! through login, discovery and expansion without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use forumdex_core::forum::StoredCookie;
use forumdex_core::testing::fixtures::{self, FixtureRelease};
use forumdex_core::testing::{MemorySessionStore, MockResponse, MockTransport};
use forumdex_core::{
    create_authenticator, load_config_from_str, Credentials, LoginSettings, SearchPipeline,
    SessionManager,
};
use forumdex_server::{create_router, AppState};

pub const BASE: &str = "https://forum.example.org";

/// Knobs for the fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Protect the API with this key
    pub api_key: Option<String>,
    /// Leave every forum route unscripted (404)
    pub forum_down: bool,
}

impl TestConfig {
    pub fn with_api_key(key: &str) -> Self {
        Self {
            api_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn forum_down() -> Self {
        Self {
            forum_down: true,
            ..Default::default()
        }
    }
}

pub struct TestFixture {
    pub router: Router,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemorySessionStore>,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let auth = match &test_config.api_key {
            Some(key) => format!("method = \"api_key\"\napi_key = \"{}\"", key),
            None => "method = \"none\"".to_string(),
        };
        let config = load_config_from_str(&format!(
            r#"
[auth]
{auth}

[forum]
base_url = "{BASE}"
username = "alice"
password = "hunter2"
login_max_attempts = 2
login_initial_backoff_ms = 1
login_max_backoff_ms = 5
thanks_enabled = false

[renewal]
enabled = false
"#
        ))
        .expect("valid test config");

        let transport = Arc::new(MockTransport::new(BASE));
        if !test_config.forum_down {
            script_forum(&transport).await;
        }
        let store = Arc::new(MemorySessionStore::new());

        let session = Arc::new(SessionManager::new(
            Arc::clone(&transport) as Arc<dyn forumdex_core::ForumTransport>,
            Arc::clone(&store) as Arc<dyn forumdex_core::SessionStore>,
            BASE,
            Credentials::new("alice", "hunter2").unwrap(),
            LoginSettings::from_config(&config.forum),
        ));
        let pipeline = Arc::new(SearchPipeline::from_config(&config, session, None));
        let authenticator = create_authenticator(&config.auth).expect("authenticator");

        let state = Arc::new(AppState::new(config, authenticator, pipeline));
        let router = create_router(state);

        Self {
            router,
            transport,
            store,
        }
    }

    /// Send a GET request to the router.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request with an `X-Api-Key` header.
    pub async fn get_with_key(&self, path: &str, key: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .header("X-Api-Key", key)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            content_type,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
        }
    }
}

/// Login flow, a two-thread search and one thread with three releases.
async fn script_forum(transport: &MockTransport) {
    transport
        .script_get(
            "/index.php",
            vec![
                MockResponse::ok(fixtures::index_logged_out()),
                MockResponse::ok(fixtures::index_logged_in("alice")),
            ],
        )
        .await;
    transport
        .script_get("/ucp.php", vec![MockResponse::ok(fixtures::login_page())])
        .await;
    transport
        .script_post(
            "/ucp.php",
            vec![MockResponse::ok(fixtures::index_logged_in("alice")).with_cookies(vec![
                StoredCookie {
                    name: "phpbb3_abc_sid".to_string(),
                    value: "0f1e2d3c4b5a69788796a5b4".to_string(),
                },
                StoredCookie {
                    name: "phpbb3_abc_u".to_string(),
                    value: "2".to_string(),
                },
            ])],
        )
        .await;
    transport
        .script_get(
            "/search.php",
            vec![MockResponse::ok(fixtures::search_results(&[
                ("10", "Dark - Stagione 1 [720p]"),
                ("20", "Dark - Stagione 2 [720p]"),
            ]))],
        )
        .await;
    transport
        .script_get(
            "/viewtopic.php?t=10",
            vec![MockResponse::ok(fixtures::thread_page(
                "10",
                "Dark - Stagione 1 [720p]",
                &[
                    FixtureRelease::new("Dark S01E01 720p", &fixtures::magnet("a1", None, None)),
                    FixtureRelease::new("Dark S01E02 720p", &fixtures::magnet("a2", None, None)),
                    FixtureRelease::new(
                        "Dark Stagione 1 Completa 4.2 GB",
                        &fixtures::magnet("a3", None, None),
                    ),
                ],
                false,
            ))],
        )
        .await;
    transport
        .script_get(
            "/viewtopic.php?t=20",
            vec![MockResponse::ok(fixtures::thread_page(
                "20",
                "Dark - Stagione 2 [720p]",
                &[FixtureRelease::new(
                    "Dark S02E01 1080p",
                    &fixtures::magnet("b1", None, None),
                )],
                false,
            ))],
        )
        .await;
}
