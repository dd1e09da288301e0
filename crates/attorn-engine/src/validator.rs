//! Token validation, direct or through the two-tier cache.

use std::sync::Arc;

use attorn_core::TokenId;
use attorn_distributed::{DistributedValidator, StoreAuthenticator, TokenAuthenticator};
use attorn_tokens::{Token, wire};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::EngineResult;

#[derive(Debug)]
pub(crate) enum Validator {
    Direct(StoreAuthenticator),
    Cached(Arc<DistributedValidator>),
}

impl Validator {
    /// Validate `value` and return the token it encodes.
    pub(crate) async fn validate(&self, value: &str) -> EngineResult<Token> {
        match self {
            Self::Direct(auth) => Ok(auth.validate_token(value).await?),
            Self::Cached(cached) => {
                cached.validate_token(value).await?;
                // The record is bound to this exact value, so its claims
                // are the validated ones.
                let (header, claims) = wire::decode_unverified(value)?;
                Ok(claims.into_token(header.alg, value.to_string())?)
            },
        }
    }

    pub(crate) async fn revoke(&self, value: &str, reason: &str) -> EngineResult<()> {
        match self {
            Self::Direct(auth) => auth.revoke_token(value, reason).await?,
            Self::Cached(cached) => cached.revoke_token(value, reason).await?,
        }
        Ok(())
    }

    pub(crate) fn subscribe(&self) -> Option<broadcast::Receiver<TokenId>> {
        match self {
            Self::Direct(_) => None,
            Self::Cached(cached) => Some(cached.subscribe_revocations()),
        }
    }

    pub(crate) fn follow(&self, rx: broadcast::Receiver<TokenId>) -> Option<JoinHandle<()>> {
        match self {
            Self::Direct(_) => None,
            Self::Cached(cached) => Some(cached.follow_revocations(rx)),
        }
    }

    pub(crate) fn cached(&self) -> Option<&DistributedValidator> {
        match self {
            Self::Direct(_) => None,
            Self::Cached(cached) => Some(cached),
        }
    }
}
