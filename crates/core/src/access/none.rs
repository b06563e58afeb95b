use async_trait::async_trait;

use super::{AccessError, AccessRequest, Authenticator, Identity};

/// Lets every request through as anonymous. Only used when configured explicitly.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AccessRequest) -> Result<Identity, AccessError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
