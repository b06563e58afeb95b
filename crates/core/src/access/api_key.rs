//! Shared API key authentication.

use async_trait::async_trait;

use super::{AccessError, AccessRequest, Authenticator, Identity};

/// Validates requests against the configured API key.
///
/// The key is looked up in order: `apikey` query parameter, `X-Api-Key`
/// header, `Authorization: Bearer <key>`.
pub struct ApiKeyAuthenticator {
    expected_key: String,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: String) -> Self {
        Self {
            expected_key: api_key,
        }
    }

    fn extract_key<'a>(&self, request: &'a AccessRequest) -> Option<&'a str> {
        if let Some(key) = request.query_api_key.as_deref() {
            return Some(key);
        }
        if let Some(key) = request.header("x-api-key") {
            return Some(key);
        }
        request.header("authorization").and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AccessRequest) -> Result<Identity, AccessError> {
        let provided = self
            .extract_key(request)
            .ok_or(AccessError::NotAuthenticated)?;

        if constant_time_eq(provided.as_bytes(), self.expected_key.as_bytes()) {
            Ok(Identity {
                user_id: "api_key_user".to_string(),
                method: "api_key",
            })
        } else {
            Err(AccessError::InvalidKey)
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], query: Option<&str>) -> AccessRequest {
        AccessRequest {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            query_api_key: query.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_query_parameter_key() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let identity = auth.authenticate(&request(&[], Some("secret"))).await.unwrap();
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_header_keys() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        for headers in [
            [("X-Api-Key", "secret")],
            [("Authorization", "Bearer secret")],
            [("Authorization", "bearer secret")],
        ] {
            assert!(auth.authenticate(&request(&headers, None)).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_wrong_and_missing_key() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        assert!(matches!(
            auth.authenticate(&request(&[], Some("nope"))).await,
            Err(AccessError::InvalidKey)
        ));
        assert!(matches!(
            auth.authenticate(&request(&[("Authorization", "Basic abc")], None)).await,
            Err(AccessError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_query_key_takes_precedence() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let result = auth
            .authenticate(&request(&[("X-Api-Key", "secret")], Some("wrong")))
            .await;
        assert!(matches!(result, Err(AccessError::InvalidKey)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
