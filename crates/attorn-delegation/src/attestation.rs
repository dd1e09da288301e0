//! Multi-party attestation of delegations.
//!
//! A requirement names an attester type, a level, the available attesters
//! and how many must attest. The service signs one attestation per required
//! attester on the blocking pool, persists them, and later re-verifies them
//! (age and signature) on demand.

use std::sync::Arc;

use attorn_core::{AttestationId, Clock, SystemClock};
use attorn_crypto::{Signer, Verifier};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DelegationError, DelegationResult};
use crate::model::{Attestation, AttestationLevel, AttestationStatus, AttesterType};

/// A request for attestations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequirement {
    /// Attester type name, e.g. `notary_public`.
    pub attester_type: String,
    /// Level name: `basic`, `enhanced` or `maximum`.
    pub level: String,
    /// Attesters available, in preference order.
    pub attesters: Vec<String>,
    /// How many must attest. Zero means all of `attesters`, and at least one.
    #[serde(default)]
    pub required_count: usize,
    /// Require at least two resulting attestations.
    #[serde(default)]
    pub multi_signature: bool,
}

impl AttestationRequirement {
    /// A requirement where every listed attester must attest.
    #[must_use]
    pub fn new<I, S>(attester_type: impl Into<String>, level: impl Into<String>, attesters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attester_type: attester_type.into(),
            level: level.into(),
            attesters: attesters.into_iter().map(Into::into).collect(),
            required_count: 0,
            multi_signature: false,
        }
    }

    /// Require `count` attesters.
    #[must_use]
    pub fn required(mut self, count: usize) -> Self {
        self.required_count = count;
        self
    }

    /// Require multi-signature.
    #[must_use]
    pub fn multi_signature(mut self) -> Self {
        self.multi_signature = true;
        self
    }
}

/// Produces, stores and verifies attestations.
#[derive(Debug)]
pub struct AttestationService {
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn Verifier>,
    attestations: DashMap<AttestationId, Attestation>,
    clock: Arc<dyn Clock>,
}

impl AttestationService {
    /// Sign with `signer`, verify with `verifier`.
    #[must_use]
    pub fn new(signer: Arc<dyn Signer>, verifier: Arc<dyn Verifier>) -> Self {
        Self {
            signer,
            verifier,
            attestations: DashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for timestamps and age checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Produce and persist the attestations `req` calls for.
    ///
    /// Nothing is persisted if the request is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown type or level, too few attesters, an
    /// unmet multi-signature requirement, or a signing failure.
    pub async fn process_requirement(
        &self,
        req: &AttestationRequirement,
    ) -> DelegationResult<Vec<Attestation>> {
        let attester_type: AttesterType = req.attester_type.parse()?;
        let level: AttestationLevel = req.level.parse()?;

        // At least one attestation always results.
        let required = if req.required_count == 0 {
            req.attesters.len().max(1)
        } else {
            req.required_count
        };
        if req.attesters.len() < required {
            return Err(DelegationError::InsufficientAttesters {
                required,
                provided: req.attesters.len(),
            });
        }
        if req.multi_signature && required < 2 {
            return Err(DelegationError::MultiSignatureRequired { produced: required });
        }

        let mut produced = Vec::with_capacity(required);
        for attester_id in req.attesters.iter().take(required) {
            produced.push(self.sign(attester_type, attester_id, level).await?);
        }

        for attestation in &produced {
            self.attestations
                .insert(attestation.id.clone(), attestation.clone());
        }
        info!(
            attester_type = %attester_type,
            level = %level,
            count = produced.len(),
            "attestations recorded"
        );
        Ok(produced)
    }

    async fn sign(
        &self,
        attester_type: AttesterType,
        attester_id: &str,
        level: AttestationLevel,
    ) -> DelegationResult<Attestation> {
        let timestamp = whole_seconds(self.clock.now());
        let message = Attestation::signing_message(attester_type, attester_id, level, timestamp);
        let signer = Arc::clone(&self.signer);
        let signature = tokio::task::spawn_blocking(move || signer.sign(message.as_bytes()))
            .await
            .map_err(|e| DelegationError::Internal(format!("signing task failed: {e}")))??;

        Ok(Attestation {
            id: AttestationId::generate(),
            attester_type,
            attester_id: attester_id.to_string(),
            level,
            timestamp,
            signature: hex::encode(signature),
            status: AttestationStatus::Verified,
        })
    }

    /// Look up an attestation and check its age and signature.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::AttestationNotFound`],
    /// [`DelegationError::AttestationExpired`] or
    /// [`DelegationError::AttestationSignatureInvalid`].
    pub fn verify_attestation(&self, id: &AttestationId) -> DelegationResult<Attestation> {
        let attestation = self
            .attestations
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DelegationError::AttestationNotFound { id: id.clone() })?;

        if attestation.is_expired_at(self.clock.now()) {
            return Err(DelegationError::AttestationExpired { id: id.clone() });
        }

        let message = Attestation::signing_message(
            attestation.attester_type,
            &attestation.attester_id,
            attestation.level,
            attestation.timestamp,
        );
        let valid = hex::decode(&attestation.signature)
            .is_ok_and(|sig| self.verifier.verify(message.as_bytes(), &sig));
        if !valid {
            debug!(attestation_id = %id, "attestation signature rejected");
            return Err(DelegationError::AttestationSignatureInvalid { id: id.clone() });
        }
        Ok(attestation)
    }

    /// Fetch without verifying.
    #[must_use]
    pub fn get(&self, id: &AttestationId) -> Option<Attestation> {
        self.attestations.get(id).map(|entry| entry.value().clone())
    }

    /// Number of stored attestations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    /// Whether no attestation is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }
}

fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
