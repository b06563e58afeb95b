//! Thread expansion: one thread page into per-release episode records.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ForumConfig;
use crate::episode::{
    categorize_episode, estimate_size, explicit_size, extract, extract_filename, EpisodeInfo,
    EpisodeRecord, ExtractionOutcome, ReleaseLink,
};
use crate::metrics::RELEASES_EXTRACTED;

use super::login_state::has_login_form;
use super::session::SessionManager;
use super::transport::{Page, TransportError};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("Failed to fetch thread page: {0}")]
    Transport(#[from] TransportError),

    #[error("Thread page asked for a login, session was lost")]
    SessionLost,
}

#[derive(Debug, Clone)]
pub struct ExpanderSettings {
    pub request_timeout: Duration,
    pub thanks_enabled: bool,
    pub thanks_delay_min: Duration,
    pub thanks_delay_max: Duration,
}

impl ExpanderSettings {
    pub fn from_config(config: &ForumConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            thanks_enabled: config.thanks_enabled,
            thanks_delay_min: Duration::from_millis(config.thanks_delay_min_ms),
            thanks_delay_max: Duration::from_millis(config.thanks_delay_max_ms),
        }
    }
}

/// Fields read from a magnet URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagnetInfo {
    pub display_name: Option<String>,
    pub exact_length: Option<u64>,
}

/// Read `dn` (percent and plus decoded) and `xl` from a magnet URI.
pub fn parse_magnet(uri: &str) -> MagnetInfo {
    let mut info = MagnetInfo::default();
    let Some((_, query)) = uri.split_once('?') else {
        return info;
    };
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "dn" if info.display_name.is_none() => {
                info.display_name = urlencoding::decode(&value.replace('+', " "))
                    .ok()
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty());
            }
            "xl" if info.exact_length.is_none() => {
                info.exact_length = value.parse().ok().filter(|len| *len > 0);
            }
            _ => {}
        }
    }
    info
}

static TOPIC_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.topic-title").expect("valid selector"));
static MAGNET_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="magnet:"]"#).expect("valid selector"));
static FIRST_POST: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.post.has-profile").expect("valid selector"));
static THANKS_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"ul.post-buttons a[id^="lnk_thanks_post"]"#).expect("valid selector")
});

const CONTEXT_BLOCKS: [&str; 4] = ["dd", "div", "li", "td"];

/// A release link as found on the page, before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelease {
    pub uri: String,
    /// Text of the block around the link
    pub context: String,
}

/// What the expander needs from a thread page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub title: Option<String>,
    pub releases: Vec<RawRelease>,
    pub thanks_href: Option<String>,
}

fn collapse(text: impl Iterator<Item = impl AsRef<str>>) -> String {
    let joined: String = text.map(|t| t.as_ref().to_string()).collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn context_of(link: ElementRef<'_>) -> String {
    link.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| CONTEXT_BLOCKS.contains(&el.value().name()))
        .map(|block| collapse(block.text()))
        .unwrap_or_else(|| collapse(link.text()))
}

/// Parse a thread page. Duplicate release links are reported once.
pub fn parse_thread_page(html: &str) -> ThreadPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TOPIC_TITLE)
        .next()
        .map(|el| collapse(el.text()))
        .filter(|t| !t.is_empty());

    let mut seen = HashSet::new();
    let releases = document
        .select(&MAGNET_LINK)
        .filter_map(|link| {
            let uri = link.value().attr("href")?.trim().to_string();
            if !seen.insert(uri.clone()) {
                return None;
            }
            Some(RawRelease {
                context: context_of(link),
                uri,
            })
        })
        .collect();

    let thanks_href = document
        .select(&FIRST_POST)
        .next()
        .and_then(|post| post.select(&THANKS_LINK).next())
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);

    ThreadPage {
        title,
        releases,
        thanks_href,
    }
}

/// Display title of a record: the thread title plus a normalized episode tag.
fn record_title(thread_title: &str, info: Option<&EpisodeInfo>) -> String {
    let tag = info.and_then(|info| match (info.season(), info.episode(), info.episode_range()) {
        (Some(s), Some(e), _) => Some(format!("S{:02}E{:02}", s, e)),
        (Some(s), None, Some([first, .., last])) => {
            Some(format!("S{:02}E{:02}-E{:02}", s, first, last))
        }
        (Some(s), None, _) if info.is_season_pack() => Some(format!("S{:02}", s)),
        _ => None,
    });
    match tag {
        Some(tag) => format!("{} {}", thread_title, tag),
        None => thread_title.to_string(),
    }
}

/// Turns a thread into episode records.
pub struct ThreadExpander {
    session: Arc<SessionManager>,
    settings: ExpanderSettings,
    thanked: Mutex<HashSet<String>>,
}

impl ThreadExpander {
    pub fn new(session: Arc<SessionManager>, settings: ExpanderSettings) -> Self {
        Self {
            session,
            settings,
            thanked: Mutex::new(HashSet::new()),
        }
    }

    pub fn thread_url(&self, thread_id: &str) -> String {
        self.session.url(&format!("viewtopic.php?t={}", thread_id))
    }

    /// Expand a thread. Failures are logged and yield no records.
    pub async fn expand(&self, thread_id: &str) -> Vec<EpisodeRecord> {
        match self.try_expand(thread_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(thread_id, error = %e, "Thread expansion failed");
                Vec::new()
            }
        }
    }

    pub async fn try_expand(&self, thread_id: &str) -> Result<Vec<EpisodeRecord>, ExpandError> {
        let thread_url = self.thread_url(thread_id);
        let page = self
            .session
            .get(&thread_url, self.settings.request_timeout)
            .await
            .and_then(Page::error_for_status)?;

        let parsed = parse_thread_page(&page.body);
        if parsed.releases.is_empty() && has_login_form(&page.body) {
            return Err(ExpandError::SessionLost);
        }

        let thread_title = parsed
            .title
            .clone()
            .unwrap_or_else(|| format!("Thread {}", thread_id));

        let records: Vec<EpisodeRecord> = parsed
            .releases
            .iter()
            .map(|release| build_record(thread_id, &thread_url, &thread_title, release))
            .collect();

        info!(thread_id, releases = records.len(), "Expanded thread");

        if let Some(href) = parsed.thanks_href.as_deref() {
            self.send_thanks(thread_id, href).await;
        }

        Ok(records)
    }

    /// Press the first post's "thanks" button once per thread, then pause.
    async fn send_thanks(&self, thread_id: &str, href: &str) {
        if !self.settings.thanks_enabled {
            return;
        }
        let first_time = self
            .thanked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread_id.to_string());
        if !first_time {
            return;
        }

        let url = self.session.url(href);
        match self
            .session
            .get(&url, self.settings.request_timeout)
            .await
            .and_then(Page::error_for_status)
        {
            Ok(_) => debug!(thread_id, "Thanked thread author"),
            Err(e) => warn!(thread_id, error = %e, "Failed to send thanks"),
        }

        let (min, max) = (self.settings.thanks_delay_min, self.settings.thanks_delay_max);
        let pause = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        debug!(thread_id, pause_ms = pause.as_millis() as u64, "Pausing after thanks");
        tokio::time::sleep(pause).await;
    }
}

fn build_record(
    thread_id: &str,
    thread_url: &str,
    thread_title: &str,
    release: &RawRelease,
) -> EpisodeRecord {
    let magnet = parse_magnet(&release.uri);

    let info = match extract(&release.context) {
        ExtractionOutcome::Parsed(info) => {
            RELEASES_EXTRACTED.with_label_values(&["context"]).inc();
            Some(info)
        }
        ExtractionOutcome::Unparsable => {
            let from_name = magnet
                .display_name
                .as_deref()
                .and_then(|name| extract_filename(name).into_info());
            let outcome = if from_name.is_some() {
                "display_name"
            } else {
                "unparsable"
            };
            RELEASES_EXTRACTED.with_label_values(&[outcome]).inc();
            from_name
        }
    };

    if info.is_none() {
        debug!(thread_id, context = %release.context, "No episode info for release");
    }

    let size_bytes = magnet
        .exact_length
        .or_else(|| explicit_size(&release.context))
        .unwrap_or_else(|| {
            let hints = format!(
                "{} {} {}",
                thread_title,
                release.context,
                magnet.display_name.as_deref().unwrap_or_default()
            );
            estimate_size(&hints)
        });

    let season = info.as_ref().and_then(EpisodeInfo::season);
    EpisodeRecord {
        title: record_title(thread_title, info.as_ref()),
        season,
        episode: info.as_ref().and_then(EpisodeInfo::episode),
        is_season_pack: info.as_ref().is_some_and(EpisodeInfo::is_season_pack),
        episode_range: info
            .as_ref()
            .and_then(|i| i.episode_range().map(<[u32]>::to_vec)),
        thread_id: thread_id.to_string(),
        thread_url: thread_url.to_string(),
        release_link: ReleaseLink {
            uri: release.uri.clone(),
            raw_size: magnet.exact_length,
            seeders: 1,
            peers: 0,
        },
        size_bytes,
        category: categorize_episode(thread_title, season),
        publish_time: Utc::now(),
    }
}
