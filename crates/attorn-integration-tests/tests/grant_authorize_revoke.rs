//! Integration tests for the grant, authorize and revoke lifecycle.
//!
//! Covers cascade revocation across every token issued under a delegation,
//! persistence through a sealed key-value store, and revocation fan-out
//! between engines sharing a token store and shared cache.

use std::sync::Arc;
use std::time::Duration;

use attorn_core::DelegationId;
use attorn_crypto::SealingKey;
use attorn_delegation::{DelegationError, DelegationStatus};
use attorn_distributed::{KvSharedCache, SharedCache};
use attorn_engine::{AuthorizeRequest, EngineError};
use attorn_storage::{KvStore, MemoryKvStore};
use attorn_test::prelude::*;
use attorn_tokens::{DELEGATION_LABEL, TokenFilter};

fn request(value: &str) -> AuthorizeRequest {
    AuthorizeRequest::new(value, "accounts/main", "pay")
}

#[tokio::test]
async fn test_cascade_covers_refreshed_tokens() {
    init_test_logging();
    let engine = test_engine_builder().build().unwrap();
    let grant = engine.grant(test_grant_request()).await.unwrap();
    let refreshed = engine.refresh(&grant.refresh.value).await.unwrap();

    let id = grant.delegation.id.clone();
    let under = TokenFilter::new().label(DELEGATION_LABEL, id.as_str());
    let live = engine
        .token_store()
        .count(&under.clone().revoked(false))
        .await
        .unwrap();
    // Original access, new access and new refresh. The old refresh was rotated.
    assert_eq!(live, 3);

    engine
        .revoke_delegation(&id, "mandate withdrawn")
        .await
        .unwrap();
    let live = engine
        .token_store()
        .count(&under.revoked(false))
        .await
        .unwrap();
    assert_eq!(live, 0);

    for value in [&grant.access.value, &refreshed.access.value] {
        assert!(engine.authorize(&request(value)).await.is_err());
    }
    assert!(engine.refresh(&refreshed.refresh.value).await.is_err());

    // Revocation is terminal and repeatable.
    let again = engine.revoke_delegation(&id, "again").await.unwrap();
    assert_eq!(again.status, DelegationStatus::Revoked);
}

#[tokio::test]
async fn test_unknown_delegation() {
    let engine = test_engine_builder().build().unwrap();
    let err = engine
        .revoke_delegation(&DelegationId::generate(), "typo")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Delegation(DelegationError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_sealed_store_survives_engine_restart() -> anyhow::Result<()> {
    let keys = test_keys();
    let sealing = SealingKey::generate();
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let mut config = test_config();
    config.tokens.encrypt_at_rest = true;

    let first = test_engine_builder_with(config.clone())
        .with_signing_key(keys.clone())
        .with_sealing_key(sealing.clone())
        .with_token_kv(kv.clone())
        .build()?;
    let grant = first.grant(test_grant_request()).await?;

    // A second engine over the same store sees the issued tokens.
    let second = test_engine_builder_with(config)
        .with_signing_key(keys)
        .with_sealing_key(sealing)
        .with_token_kv(kv.clone())
        .build()?;
    let stored = second.token_store().get(grant.access.id.as_str()).await?;
    assert_eq!(stored.value, grant.access.value);
    assert_eq!(stored.delegation_id(), Some(grant.delegation.id.as_str()));

    // Without the sealing key the records are unreadable.
    let mut plain = test_config();
    plain.tokens.encrypt_at_rest = false;
    let unsealed = test_engine_builder_with(plain).with_token_kv(kv).build()?;
    assert!(
        unsealed
            .token_store()
            .get(grant.access.id.as_str())
            .await
            .is_err()
    );
    Ok(())
}

#[tokio::test]
async fn test_peer_revocation_evicts_local_cache() {
    let keys = test_keys();
    let tokens: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let shared: Arc<dyn SharedCache> = Arc::new(KvSharedCache::new(Arc::new(MemoryKvStore::new())));
    let engine = || {
        test_engine_builder_with(test_config())
            .with_signing_key(keys.clone())
            .with_token_kv(tokens.clone())
            .with_shared_cache(shared.clone())
            .build()
            .unwrap()
    };
    let a = engine();
    let b = engine();

    let feed = b.subscribe_revocations().unwrap();
    let follower = a.follow_revocations(feed).unwrap();

    let grant = a.grant(test_grant_request()).await.unwrap();
    a.authorize(&request(&grant.access.value)).await.unwrap();
    let cache = a.local_cache().unwrap();
    assert!(cache.get(grant.access.id.as_str()).is_some());

    b.revoke_token(&grant.access.value, "stolen").await.unwrap();

    let evicted = async {
        while cache.get(grant.access.id.as_str()).is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), evicted)
        .await
        .unwrap();
    assert!(a.authorize(&request(&grant.access.value)).await.is_err());

    follower.abort();
}
