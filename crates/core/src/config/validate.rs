use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration.
///
/// Missing forum credentials are reported as [`ConfigError::MissingCredentials`],
/// the one condition the binary treats as fatal at startup.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    let forum = &config.forum;
    if forum.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "forum.base_url cannot be empty".to_string(),
        ));
    }
    if !forum.base_url.starts_with("http://") && !forum.base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "forum.base_url must be an http(s) URL, got '{}'",
            forum.base_url
        )));
    }
    if forum.username.trim().is_empty() {
        return Err(ConfigError::MissingCredentials(
            "forum.username is empty".to_string(),
        ));
    }
    if forum.password.is_empty() {
        return Err(ConfigError::MissingCredentials(
            "forum.password is empty".to_string(),
        ));
    }
    if forum.login_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "forum.login_max_attempts must be at least 1".to_string(),
        ));
    }
    if forum.login_initial_backoff_ms > forum.login_max_backoff_ms {
        return Err(ConfigError::ValidationError(
            "forum.login_initial_backoff_ms exceeds forum.login_max_backoff_ms".to_string(),
        ));
    }
    if forum.thanks_delay_min_ms > forum.thanks_delay_max_ms {
        return Err(ConfigError::ValidationError(
            "forum.thanks_delay_min_ms exceeds forum.thanks_delay_max_ms".to_string(),
        ));
    }
    if forum.max_threads_per_search == 0 || forum.expansion_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "forum.max_threads_per_search and forum.expansion_concurrency must be positive"
                .to_string(),
        ));
    }

    let renewal = &config.renewal;
    if renewal.min_interval_ms > renewal.max_interval_ms {
        return Err(ConfigError::ValidationError(
            "renewal.min_interval_ms exceeds renewal.max_interval_ms".to_string(),
        ));
    }
    if renewal.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "renewal.failure_threshold must be at least 1".to_string(),
        ));
    }

    if let Some(tracker) = &config.tracker {
        if tracker.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "tracker.url cannot be empty".to_string(),
            ));
        }
        if tracker.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "tracker.max_attempts must be at least 1".to_string(),
            ));
        }
    }

    Ok(())
}
