//! Narrowing records to the episodes the tracker still wants.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::episode::EpisodeRecord;
use crate::metrics::RECONCILIATION_OUTCOMES;
use crate::tracker::{titles_match, EpisodeTracker, TrackedSeries, TrackerError};

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Tracker unreachable after {attempts} attempts: {last_error}")]
    TrackerUnreachable {
        attempts: u32,
        last_error: TrackerError,
    },
}

/// Why the tracker wants nothing for a series/season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingWanted {
    SeriesNotTracked,
    SeriesUnmonitored,
    NoMissingEpisodes,
}

/// `(season, episode)` pairs that are monitored and missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingEpisodeSet(HashSet<(u32, u32)>);

impl MissingEpisodeSet {
    pub fn contains(&self, season: u32, episode: u32) -> bool {
        self.0.contains(&(season, episode))
    }

    /// Whether any episode of `season` is missing.
    pub fn has_season(&self, season: u32) -> bool {
        self.0.iter().any(|(s, _)| *s == season)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, u32)> for MissingEpisodeSet {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Answer of the tracker for one series/season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingEpisodes {
    Wanted(MissingEpisodeSet),
    NothingWanted(NothingWanted),
}

/// Keep the records that can satisfy a missing episode.
///
/// Records without a season are attributed to `season`. A record naming one
/// episode must hit the set exactly; packs, ranges and records with no
/// episode are kept if anything of their season is missing.
pub fn apply(records: Vec<EpisodeRecord>, missing: &MissingEpisodeSet, season: u32) -> Vec<EpisodeRecord> {
    records
        .into_iter()
        .filter(|record| {
            let record_season = record.season.unwrap_or(season);
            match record.episode {
                Some(episode) if !record.covers_whole_season() => {
                    missing.contains(record_season, episode)
                }
                _ => missing.has_season(record_season),
            }
        })
        .collect()
}

fn pick_series<'a>(series: &'a [TrackedSeries], wanted: &str) -> Option<&'a TrackedSeries> {
    series
        .iter()
        .find(|s| s.title.eq_ignore_ascii_case(wanted.trim()))
        .or_else(|| series.iter().find(|s| titles_match(&s.title, wanted)))
}

/// Cross-checks releases with the episode tracker.
pub struct ReconciliationFilter {
    tracker: Arc<dyn EpisodeTracker>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl ReconciliationFilter {
    pub fn new(tracker: Arc<dyn EpisodeTracker>, max_attempts: u32, retry_backoff: Duration) -> Self {
        Self {
            tracker,
            max_attempts: max_attempts.max(1),
            retry_backoff,
        }
    }

    pub fn from_config(tracker: Arc<dyn EpisodeTracker>, config: &TrackerConfig) -> Self {
        Self::new(
            tracker,
            config.max_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Keep only records of wanted episodes.
    ///
    /// "Nothing wanted" is authoritative and yields an empty list; an
    /// unreachable tracker yields the input unchanged.
    pub async fn filter(
        &self,
        records: Vec<EpisodeRecord>,
        series: &str,
        season: u32,
    ) -> Vec<EpisodeRecord> {
        match self.missing_episodes(series, season).await {
            Ok(MissingEpisodes::Wanted(missing)) => {
                let before = records.len();
                let kept = apply(records, &missing, season);
                RECONCILIATION_OUTCOMES.with_label_values(&["filtered"]).inc();
                info!(
                    series,
                    season,
                    missing = missing.len(),
                    before,
                    kept = kept.len(),
                    "Reconciled releases with tracker"
                );
                kept
            }
            Ok(MissingEpisodes::NothingWanted(reason)) => {
                RECONCILIATION_OUTCOMES
                    .with_label_values(&["nothing_wanted"])
                    .inc();
                info!(series, season, ?reason, "Tracker wants nothing for this season");
                Vec::new()
            }
            Err(e) => {
                RECONCILIATION_OUTCOMES.with_label_values(&["unreachable"]).inc();
                warn!(series, season, error = %e, "Returning unfiltered releases");
                records
            }
        }
    }

    /// Ask the tracker which episodes of `season` are monitored and missing.
    pub async fn missing_episodes(
        &self,
        series: &str,
        season: u32,
    ) -> Result<MissingEpisodes, ReconciliationError> {
        let all_series = self
            .with_retries("list_series", || self.tracker.list_series())
            .await?;

        let Some(tracked) = pick_series(&all_series, series) else {
            debug!(series, tracker = self.tracker.name(), "Series not tracked");
            return Ok(MissingEpisodes::NothingWanted(NothingWanted::SeriesNotTracked));
        };
        if !tracked.monitored {
            return Ok(MissingEpisodes::NothingWanted(NothingWanted::SeriesUnmonitored));
        }

        let series_id = tracked.id;
        let episodes = self
            .with_retries("list_episodes", || self.tracker.list_episodes(series_id))
            .await?;

        let missing: MissingEpisodeSet = episodes
            .iter()
            .filter(|e| e.season_number == season && e.is_missing())
            .map(|e| (e.season_number, e.episode_number))
            .collect();

        if missing.is_empty() {
            Ok(MissingEpisodes::NothingWanted(NothingWanted::NoMissingEpisodes))
        } else {
            Ok(MissingEpisodes::Wanted(missing))
        }
    }

    async fn with_retries<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, ReconciliationError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TrackerError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %e, "Tracker request failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ReconciliationError::TrackerUnreachable {
                        attempts: attempt,
                        last_error: e,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::ReleaseLink;
    use crate::testing::MockEpisodeTracker;
    use chrono::Utc;

    fn record(season: Option<u32>, episode: Option<u32>, pack: bool) -> EpisodeRecord {
        EpisodeRecord {
            title: "Dark".to_string(),
            season,
            episode,
            is_season_pack: pack,
            episode_range: None,
            thread_id: "1".to_string(),
            thread_url: "https://forum.example.org/viewtopic.php?t=1".to_string(),
            release_link: ReleaseLink {
                uri: format!("magnet:?xt=urn:btih:{:?}{:?}", season, episode),
                raw_size: None,
                seeders: 1,
                peers: 0,
            },
            size_bytes: 1,
            category: 5000,
            publish_time: Utc::now(),
        }
    }

    async fn tracker() -> Arc<MockEpisodeTracker> {
        let tracker = Arc::new(MockEpisodeTracker::new());
        tracker.add_series(1, "Dark", true).await;
        tracker.add_series(2, "Dexter", false).await;
        tracker
            .set_episodes(
                1,
                &[
                    (1, 1, true, false),
                    (1, 2, true, true),
                    (1, 3, false, false),
                    (2, 1, true, false),
                ],
            )
            .await;
        tracker
    }

    fn filter(tracker: Arc<MockEpisodeTracker>) -> ReconciliationFilter {
        ReconciliationFilter::new(tracker, 3, Duration::from_millis(1))
    }

    #[test]
    fn test_apply_keeps_exact_and_season_wide_records() {
        let missing: MissingEpisodeSet = [(1, 1)].into_iter().collect();
        let records = vec![record(Some(1), Some(1), false), record(Some(1), None, true)];
        let kept = apply(records, &missing, 1);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_apply_drops_unwanted() {
        let missing: MissingEpisodeSet = [(1, 1)].into_iter().collect();
        let records = vec![
            record(Some(1), Some(2), false),
            record(Some(2), None, true),
            record(None, Some(1), false),
            record(None, None, false),
        ];
        let kept = apply(records, &missing, 1);
        // the season-less records are attributed to season 1
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].episode, Some(1));
        assert_eq!(kept[1].episode, None);
    }

    #[test]
    fn test_apply_with_empty_set_is_empty() {
        let records = vec![record(Some(1), Some(1), false), record(Some(1), None, true)];
        assert!(apply(records, &MissingEpisodeSet::default(), 1).is_empty());
    }

    #[tokio::test]
    async fn test_missing_episodes_only_monitored_and_missing_in_season() {
        let tracker = tracker().await;
        let result = filter(tracker).missing_episodes("Dark", 1).await.unwrap();
        let expected: MissingEpisodeSet = [(1, 1)].into_iter().collect();
        assert_eq!(result, MissingEpisodes::Wanted(expected));
    }

    #[tokio::test]
    async fn test_nothing_wanted_is_empty_result() {
        let tracker = tracker().await;
        tracker.set_episodes(1, &[(1, 1, true, true)]).await;
        let filter = filter(tracker);
        let records = vec![record(Some(1), Some(1), false), record(Some(1), None, true)];

        assert_eq!(
            filter.missing_episodes("Dark", 1).await.unwrap(),
            MissingEpisodes::NothingWanted(NothingWanted::NoMissingEpisodes)
        );
        assert!(filter.filter(records, "Dark", 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unmonitored_and_unknown_series() {
        let filter = filter(tracker().await);
        assert_eq!(
            filter.missing_episodes("Dexter", 1).await.unwrap(),
            MissingEpisodes::NothingWanted(NothingWanted::SeriesUnmonitored)
        );
        assert_eq!(
            filter.missing_episodes("Twin Peaks", 1).await.unwrap(),
            MissingEpisodes::NothingWanted(NothingWanted::SeriesNotTracked)
        );
    }

    #[tokio::test]
    async fn test_series_matched_by_title_words() {
        let tracker = tracker().await;
        let filter = filter(tracker.clone());
        let kept = filter
            .filter(vec![record(Some(1), Some(1), false)], "Dark (2017)", 1)
            .await;
        assert_eq!(kept.len(), 1);
        assert_eq!(tracker.calls().await, vec!["list_series", "list_episodes:1"]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let tracker = tracker().await;
        tracker.fail_next(2, TrackerError::Timeout).await;
        let filter = filter(tracker.clone());

        let kept = filter
            .filter(vec![record(Some(1), Some(2), false)], "Dark", 1)
            .await;
        assert!(kept.is_empty());
        assert_eq!(tracker.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn test_unreachable_tracker_returns_input() {
        let tracker = tracker().await;
        tracker
            .fail_next(10, TrackerError::ConnectionFailed("refused".to_string()))
            .await;
        let filter = filter(tracker.clone());
        let records = vec![record(Some(1), Some(2), false), record(Some(3), None, true)];

        let err = filter.missing_episodes("Dark", 1).await.unwrap_err();
        assert!(matches!(
            err,
            ReconciliationError::TrackerUnreachable { attempts: 3, .. }
        ));

        let kept = filter.filter(records.clone(), "Dark", 1).await;
        assert_eq!(kept, records);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let tracker = tracker().await;
        tracker.fail_next(1, TrackerError::Unauthorized).await;
        let filter = filter(tracker.clone());

        let err = filter.missing_episodes("Dark", 1).await.unwrap_err();
        assert!(matches!(
            err,
            ReconciliationError::TrackerUnreachable {
                attempts: 1,
                last_error: TrackerError::Unauthorized
            }
        ));
        assert_eq!(tracker.calls().await.len(), 1);
    }
}
