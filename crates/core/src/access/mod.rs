//! Access control for the HTTP surface.
//!
//! Feed clients authenticate with a shared API key, passed as an `apikey`
//! query parameter (Torznab convention), an `X-Api-Key` header or an
//! `Authorization: Bearer` header.

mod api_key;
mod none;

pub use api_key::ApiKeyAuthenticator;
pub use none::NoneAuthenticator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AuthConfig, AuthMethod};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// What an authenticator gets to see of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    /// Header names lowercased
    pub headers: HashMap<String, String>,
    /// Value of the `apikey` query parameter, if any
    pub query_api_key: Option<String>,
}

impl AccessRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Who made a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub method: &'static str,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none",
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AccessRequest) -> Result<Identity, AccessError>;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}

/// Build the authenticator selected in config.
pub fn create_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, AccessError> {
    match config.method {
        AuthMethod::None => Ok(Arc::new(NoneAuthenticator)),
        AuthMethod::ApiKey => {
            let api_key = config
                .api_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    AccessError::ConfigurationError(
                        "api_key must be set when using the api_key method".to_string(),
                    )
                })?;
            Ok(Arc::new(ApiKeyAuthenticator::new(api_key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_authenticator_none() {
        let config = AuthConfig {
            method: AuthMethod::None,
            api_key: None,
        };
        assert_eq!(create_authenticator(&config).unwrap().method_name(), "none");
    }

    #[test]
    fn test_create_authenticator_api_key() {
        let config = AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        };
        assert_eq!(create_authenticator(&config).unwrap().method_name(), "api_key");
    }

    #[test]
    fn test_create_authenticator_rejects_missing_key() {
        for api_key in [None, Some(String::new())] {
            let config = AuthConfig {
                method: AuthMethod::ApiKey,
                api_key,
            };
            assert!(matches!(
                create_authenticator(&config),
                Err(AccessError::ConfigurationError(_))
            ));
        }
    }

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(identity.method, "none");
    }
}
