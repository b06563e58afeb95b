//! Mock episode tracker for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tracker::{EpisodeTracker, TrackedEpisode, TrackedSeries, TrackerError};

/// Mock implementation of [`EpisodeTracker`].
///
/// Series and episodes are configured up front; failures can be injected for
/// the next N calls to exercise retry and fallback paths.
#[derive(Debug, Default)]
pub struct MockEpisodeTracker {
    series: Arc<RwLock<Vec<TrackedSeries>>>,
    episodes: Arc<RwLock<HashMap<i64, Vec<TrackedEpisode>>>>,
    failures_remaining: Arc<RwLock<u32>>,
    failure: Arc<RwLock<Option<TrackerError>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEpisodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_series(&self, id: i64, title: &str, monitored: bool) {
        self.series.write().await.push(TrackedSeries {
            id,
            title: title.to_string(),
            monitored,
        });
    }

    /// Episodes of `series_id`: `(season, episode, monitored, has_file)`.
    pub async fn set_episodes(&self, series_id: i64, episodes: &[(u32, u32, bool, bool)]) {
        self.episodes.write().await.insert(
            series_id,
            episodes
                .iter()
                .map(|&(season_number, episode_number, monitored, has_file)| TrackedEpisode {
                    season_number,
                    episode_number,
                    monitored,
                    has_file,
                })
                .collect(),
        );
    }

    /// Make the next `count` calls fail with `error`.
    pub async fn fail_next(&self, count: u32, error: TrackerError) {
        *self.failures_remaining.write().await = count;
        *self.failure.write().await = Some(error);
    }

    /// Names of the calls made, in order ("list_series", "list_episodes:<id>").
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    async fn injected_failure(&self) -> Option<TrackerError> {
        let mut remaining = self.failures_remaining.write().await;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        self.failure.read().await.clone()
    }
}

#[async_trait]
impl EpisodeTracker for MockEpisodeTracker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_series(&self) -> Result<Vec<TrackedSeries>, TrackerError> {
        self.calls.write().await.push("list_series".to_string());
        if let Some(error) = self.injected_failure().await {
            return Err(error);
        }
        Ok(self.series.read().await.clone())
    }

    async fn list_episodes(&self, series_id: i64) -> Result<Vec<TrackedEpisode>, TrackerError> {
        self.calls
            .write()
            .await
            .push(format!("list_episodes:{}", series_id));
        if let Some(error) = self.injected_failure().await {
            return Err(error);
        }
        Ok(self
            .episodes
            .read()
            .await
            .get(&series_id)
            .cloned()
            .unwrap_or_default())
    }
}
