//! Offline app state for handler and middleware unit tests.

use std::sync::Arc;

use chrono::Utc;
use forumdex_core::testing::{MemorySessionStore, MockTransport};
use forumdex_core::{
    load_config_from_str, Authenticator, Credentials, EpisodeRecord, LoginSettings, ReleaseLink,
    SearchPipeline, SessionManager,
};

use crate::state::AppState;

const BASE: &str = "https://forum.example.org";

/// State over a forum that answers 404 everywhere.
pub fn test_state(authenticator: Arc<dyn Authenticator>) -> Arc<AppState> {
    let config = load_config_from_str(&format!(
        r#"
[auth]
method = "none"

[forum]
base_url = "{BASE}"
username = "alice"
password = "hunter2"
login_max_attempts = 1
"#
    ))
    .unwrap();

    let session = Arc::new(SessionManager::new(
        Arc::new(MockTransport::new(BASE)),
        Arc::new(MemorySessionStore::new()),
        BASE,
        Credentials::new("alice", "hunter2").unwrap(),
        LoginSettings::from_config(&config.forum),
    ));
    let pipeline = Arc::new(SearchPipeline::from_config(&config, session, None));
    Arc::new(AppState::new(config, authenticator, pipeline))
}

pub fn record(n: u32) -> EpisodeRecord {
    EpisodeRecord {
        title: format!("Dark S01E{:02}", n),
        season: Some(1),
        episode: Some(n),
        is_season_pack: false,
        episode_range: None,
        thread_id: "10".to_string(),
        thread_url: format!("{}/viewtopic.php?t=10", BASE),
        release_link: ReleaseLink {
            uri: format!("magnet:?xt=urn:btih:{:040}", n),
            raw_size: None,
            seeders: 1,
            peers: 0,
        },
        size_bytes: 1,
        category: 5000,
        publish_time: Utc::now(),
    }
}
