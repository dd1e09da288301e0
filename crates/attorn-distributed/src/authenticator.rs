//! The authoritative tier behind the caches.

use std::sync::Arc;

use async_trait::async_trait;
use attorn_tokens::{
    RevocationList, Token, TokenResult, TokenStore, ValidationPipeline, wire,
};
use tracing::info;

/// Recorded as `revoked_by` on tokens revoked through an authenticator.
pub const DISTRIBUTED_REVOKER: &str = "distributed-validator";

/// Validates and revokes tokens presented as wire values.
#[async_trait]
pub trait TokenAuthenticator: Send + Sync + std::fmt::Debug {
    /// Validate `value` and return the stored token.
    async fn validate_token(&self, value: &str) -> TokenResult<Token>;

    /// Revoke the token `value` encodes. Revoking twice succeeds.
    async fn revoke_token(&self, value: &str, reason: &str) -> TokenResult<()>;
}

/// Pipeline checks followed by the store's own validation.
#[derive(Debug, Clone)]
pub struct StoreAuthenticator {
    pipeline: ValidationPipeline,
    store: Arc<dyn TokenStore>,
    revocations: Option<Arc<RevocationList>>,
}

impl StoreAuthenticator {
    /// Authenticate against `store`.
    #[must_use]
    pub fn new(pipeline: ValidationPipeline, store: Arc<dyn TokenStore>) -> Self {
        Self {
            pipeline,
            store,
            revocations: None,
        }
    }

    /// Also blacklist revoked IDs in `list` until the token expires.
    ///
    /// Pass the same list the pipeline checks at its revocation stage.
    #[must_use]
    pub fn with_revocation_list(mut self, list: Arc<RevocationList>) -> Self {
        self.revocations = Some(list);
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }
}

#[async_trait]
impl TokenAuthenticator for StoreAuthenticator {
    async fn validate_token(&self, value: &str) -> TokenResult<Token> {
        let token = self.pipeline.validate_value(value)?;
        self.store.validate(&token).await
    }

    async fn revoke_token(&self, value: &str, reason: &str) -> TokenResult<()> {
        // The store compares the full value, so a forged one fails there.
        let (header, claims) = wire::decode_unverified(value)?;
        let token = claims.into_token(header.alg, value.to_string())?;
        let revoked = self
            .store
            .revoke(&token, reason, DISTRIBUTED_REVOKER)
            .await?;
        if let Some(list) = &self.revocations {
            list.revoke(revoked.id.clone(), revoked.expires_at);
        }
        info!(token_id = %revoked.id, reason, "token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attorn_crypto::{KeyPair, Verifier};
    use attorn_tokens::{
        MemoryTokenStore, TokenError, TokenIssuer, TokenRequest, ValidationConfig,
    };

    fn fixture() -> (TokenIssuer, StoreAuthenticator, Arc<RevocationList>) {
        let keys = Arc::new(KeyPair::generate());
        let issuer = TokenIssuer::new(keys.clone(), "issuer");
        let list = Arc::new(RevocationList::new());
        let verifier: Arc<dyn Verifier> = keys;
        let pipeline =
            ValidationPipeline::new(ValidationConfig::default(), Some(verifier), list.clone())
                .unwrap();
        let auth = StoreAuthenticator::new(pipeline, Arc::new(MemoryTokenStore::new()))
            .with_revocation_list(list.clone());
        (issuer, auth, list)
    }

    #[tokio::test]
    async fn test_validate_then_revoke() {
        let (issuer, auth, list) = fixture();
        let token = issuer.issue(TokenRequest::access("agent")).unwrap();
        auth.store()
            .save(token.id.as_str(), token.clone())
            .await
            .unwrap();

        let validated = auth.validate_token(&token.value).await.unwrap();
        assert_eq!(validated.id, token.id);

        auth.revoke_token(&token.value, "compromised").await.unwrap();
        // Second revocation is a no-op.
        auth.revoke_token(&token.value, "again").await.unwrap();
        assert_eq!(list.len(), 1);

        let err = auth.validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "blacklisted");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (issuer, auth, _) = fixture();
        let token = issuer.issue(TokenRequest::access("agent")).unwrap();
        let err = auth.validate_token(&token.value).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound { .. }));
    }
}
