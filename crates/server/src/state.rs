use std::sync::Arc;

use forumdex_core::{Authenticator, Config, SanitizedConfig, SearchPipeline, SessionManager};

use crate::feed::{FeedEncoder, TorznabEncoder};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    pipeline: Arc<SearchPipeline>,
    encoder: Arc<dyn FeedEncoder>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        pipeline: Arc<SearchPipeline>,
    ) -> Self {
        Self {
            config,
            authenticator,
            pipeline,
            encoder: Arc::new(TorznabEncoder::default()),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn FeedEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn pipeline(&self) -> &SearchPipeline {
        self.pipeline.as_ref()
    }

    pub fn session(&self) -> &SessionManager {
        self.pipeline.session().as_ref()
    }

    pub fn encoder(&self) -> &dyn FeedEncoder {
        self.encoder.as_ref()
    }
}
