//! Sonarr v3 API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::metrics::TRACKER_REQUESTS;

use super::{EpisodeTracker, TrackedEpisode, TrackedSeries, TrackerError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    id: i64,
    title: String,
    #[serde(default)]
    monitored: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisode {
    season_number: u32,
    episode_number: u32,
    #[serde(default)]
    monitored: bool,
    #[serde(default)]
    has_file: bool,
}

/// Read-only Sonarr client authenticated with `X-Api-Key`.
pub struct SonarrClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SonarrClient {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrackerError::ApiError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
    ) -> Result<T, TrackerError> {
        let response = self
            .client
            .get(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                TRACKER_REQUESTS.with_label_values(&[endpoint, "error"]).inc();
                if e.is_timeout() {
                    TrackerError::Timeout
                } else if e.is_connect() {
                    TrackerError::ConnectionFailed(e.to_string())
                } else {
                    TrackerError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        TRACKER_REQUESTS
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TrackerError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| TrackerError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl EpisodeTracker for SonarrClient {
    fn name(&self) -> &str {
        "sonarr"
    }

    async fn list_series(&self) -> Result<Vec<TrackedSeries>, TrackerError> {
        let series: Vec<SonarrSeries> = self.get_json("series", "/series").await?;
        debug!(count = series.len(), "Fetched series from Sonarr");
        Ok(series
            .into_iter()
            .map(|s| TrackedSeries {
                id: s.id,
                title: s.title,
                monitored: s.monitored,
            })
            .collect())
    }

    async fn list_episodes(&self, series_id: i64) -> Result<Vec<TrackedEpisode>, TrackerError> {
        let episodes: Vec<SonarrEpisode> = self
            .get_json("episode", &format!("/episode?seriesId={}", series_id))
            .await?;
        debug!(series_id, count = episodes.len(), "Fetched episodes from Sonarr");
        Ok(episodes
            .into_iter()
            .map(|e| TrackedEpisode {
                season_number: e.season_number,
                episode_number: e.episode_number,
                monitored: e.monitored,
                has_file: e.has_file,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> TrackerConfig {
        TrackerConfig {
            url: url.to_string(),
            api_key: "key".to_string(),
            timeout_secs: 1,
            max_attempts: 3,
            retry_backoff_ms: 1,
        }
    }

    #[test]
    fn test_url_building_trims_trailing_slash() {
        let client = SonarrClient::new(&config("http://sonarr:8989/")).unwrap();
        assert_eq!(client.url("/series"), "http://sonarr:8989/api/v3/series");
        assert_eq!(client.name(), "sonarr");
    }

    #[test]
    fn test_episode_payload_defaults() {
        let episodes: Vec<SonarrEpisode> =
            serde_json::from_str(r#"[{"seasonNumber": 1, "episodeNumber": 2, "title": "Pilot"}]"#)
                .unwrap();
        assert_eq!(episodes[0].episode_number, 2);
        assert!(!episodes[0].monitored);
        assert!(!episodes[0].has_file);
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_connection_error() {
        let client = SonarrClient::new(&config("http://127.0.0.1:9")).unwrap();
        let err = client.list_series().await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::ConnectionFailed(_) | TrackerError::Timeout
        ));
    }
}
