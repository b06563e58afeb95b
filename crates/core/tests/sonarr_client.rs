//! Sonarr client against a mocked HTTP API.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forumdex_core::config::TrackerConfig;
use forumdex_core::tracker::{EpisodeTracker, SonarrClient, TrackerError};

fn config(url: &str, api_key: &str) -> TrackerConfig {
    TrackerConfig {
        url: url.to_string(),
        api_key: api_key.to_string(),
        timeout_secs: 2,
        max_attempts: 3,
        retry_backoff_ms: 1,
    }
}

#[tokio::test]
async fn test_list_series_sends_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/series"))
        .and(header("X-Api-Key", "sonarr-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "Dark", "monitored": true, "year": 2017},
            {"id": 2, "title": "Dexter", "monitored": false}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = SonarrClient::new(&config(&server.uri(), "sonarr-key")).unwrap();
    let series = client.list_series().await.unwrap();

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].id, 1);
    assert_eq!(series[0].title, "Dark");
    assert!(series[0].monitored);
    assert!(!series[1].monitored);
}

#[tokio::test]
async fn test_list_episodes_by_series() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/episode"))
        .and(query_param("seriesId", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"seasonNumber": 1, "episodeNumber": 1, "monitored": true, "hasFile": true},
            {"seasonNumber": 1, "episodeNumber": 2, "monitored": true, "hasFile": false},
            {"seasonNumber": 0, "episodeNumber": 1, "monitored": false, "hasFile": false}
        ])))
        .mount(&server)
        .await;

    let client = SonarrClient::new(&config(&server.uri(), "k")).unwrap();
    let episodes = client.list_episodes(1).await.unwrap();

    assert_eq!(episodes.len(), 3);
    let missing: Vec<(u32, u32)> = episodes
        .iter()
        .filter(|e| e.is_missing())
        .map(|e| (e.season_number, e.episode_number))
        .collect();
    assert_eq!(missing, vec![(1, 2)]);
}

#[tokio::test]
async fn test_rejected_key_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/series"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = SonarrClient::new(&config(&server.uri(), "wrong")).unwrap();
    assert_eq!(client.list_series().await.unwrap_err(), TrackerError::Unauthorized);
}

#[tokio::test]
async fn test_server_error_and_bad_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/series"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/episode"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = SonarrClient::new(&config(&server.uri(), "k")).unwrap();
    let err = client.list_series().await.unwrap_err();
    assert!(matches!(err, TrackerError::ApiError(ref msg) if msg.contains("boom")));
    assert!(err.is_transient());

    let err = client.list_episodes(1).await.unwrap_err();
    assert!(matches!(err, TrackerError::ParseError(_)));
    assert!(!err.is_transient());
}
