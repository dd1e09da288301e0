//! Compact signed-claims encoding.
//!
//! A token value is `b64url(header).b64url(claims).b64url(signature)` with
//! unpadded URL-safe base64. The signature covers the first two segments
//! exactly as they appear in the value.

use attorn_core::TokenId;
use attorn_crypto::{Algorithm, Signer, Verifier};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{TokenError, TokenResult, ValidationError};
use crate::token::{Token, TokenMetadata, TokenType};

/// Value of the header `typ` field.
pub const TOKEN_TYP: &str = "ATTORN";

/// The protected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Signing algorithm.
    pub alg: Algorithm,
    /// Always [`TOKEN_TYP`].
    pub typ: String,
    /// Signing key identifier.
    pub kid: String,
}

/// The signed claim set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Token ID.
    pub jti: TokenId,
    /// Subject.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Audience.
    #[serde(default)]
    pub aud: Vec<String>,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Not-before, unix seconds.
    pub nbf: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Scopes.
    #[serde(default)]
    pub scp: Vec<String>,
    /// Token type.
    pub typ: TokenType,
    /// Power-of-attorney metadata, labels and custom claims.
    #[serde(default, skip_serializing_if = "TokenMetadata::is_empty")]
    pub poa: TokenMetadata,
}

impl Claims {
    /// The claims a token was signed over.
    #[must_use]
    pub fn from_token(token: &Token) -> Self {
        Self {
            jti: token.id.clone(),
            sub: token.subject.clone(),
            iss: token.issuer.clone(),
            aud: token.audience.clone(),
            iat: token.issued_at.timestamp(),
            nbf: token.not_before.timestamp(),
            exp: token.expires_at.timestamp(),
            scp: token.scopes.clone(),
            typ: token.token_type,
            poa: token.metadata.clone(),
        }
    }

    /// Rebuild a token from decoded claims and the value they came from.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Malformed`] for out-of-range timestamps.
    pub fn into_token(self, algorithm: Algorithm, value: String) -> Result<Token, ValidationError> {
        Ok(Token {
            id: self.jti,
            token_type: self.typ,
            subject: self.sub,
            issuer: self.iss,
            audience: self.aud,
            scopes: self.scp,
            issued_at: timestamp("iat", self.iat)?,
            not_before: timestamp("nbf", self.nbf)?,
            expires_at: timestamp("exp", self.exp)?,
            algorithm,
            value,
            revocation: None,
            last_used_at: None,
            metadata: self.poa,
        })
    }
}

fn timestamp(name: &str, secs: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ValidationError::Malformed {
        reason: format!("{name} out of range"),
    })
}

fn encode_json<T: Serialize>(value: &T) -> TokenResult<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| TokenError::Serialization(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_json<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, ValidationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ValidationError::Malformed {
            reason: format!("{name}: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| ValidationError::Malformed {
        reason: format!("{name}: {e}"),
    })
}

/// Sign `claims` and produce the compact value.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub fn encode(claims: &Claims, signer: &dyn Signer) -> TokenResult<String> {
    let header = Header {
        alg: signer.algorithm(),
        typ: TOKEN_TYP.to_string(),
        kid: signer.key_id(),
    };
    let signing_input = format!("{}.{}", encode_json(&header)?, encode_json(claims)?);
    let signature = signer.sign(signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

struct Segments<'a> {
    signing_input: &'a str,
    header: &'a str,
    claims: &'a str,
    signature: &'a str,
}

fn split(value: &str) -> Result<Segments<'_>, ValidationError> {
    let malformed = || ValidationError::Malformed {
        reason: "expected three dot-separated segments".to_string(),
    };
    let (signing_input, signature) = value.rsplit_once('.').ok_or_else(malformed)?;
    let (header, claims) = signing_input.split_once('.').ok_or_else(malformed)?;
    if claims.contains('.') || header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(malformed());
    }
    Ok(Segments {
        signing_input,
        header,
        claims,
        signature,
    })
}

/// Parse a value without checking its signature.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] if any segment fails to decode or
/// the header type is wrong.
pub fn decode_unverified(value: &str) -> Result<(Header, Claims), ValidationError> {
    let segments = split(value)?;
    let header: Header = decode_json(segments.header, "header")?;
    if header.typ != TOKEN_TYP {
        return Err(ValidationError::Malformed {
            reason: format!("unexpected header typ {}", header.typ),
        });
    }
    let claims: Claims = decode_json(segments.claims, "claims")?;
    Ok((header, claims))
}

/// Parse a value and check its signature with `verifier`.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] for encoding problems and
/// [`ValidationError::InvalidSignature`] if the signature does not verify.
pub fn decode(value: &str, verifier: &dyn Verifier) -> Result<(Header, Claims), ValidationError> {
    let segments = split(value)?;
    let (header, claims) = decode_unverified(value)?;
    let signature = URL_SAFE_NO_PAD
        .decode(segments.signature)
        .map_err(|e| ValidationError::Malformed {
            reason: format!("signature: {e}"),
        })?;
    if !verifier.verify(segments.signing_input.as_bytes(), &signature) {
        return Err(ValidationError::InvalidSignature {
            token_id: claims.jti.to_string(),
        });
    }
    Ok((header, claims))
}

/// Decode, verify and rebuild a [`Token`] from its value.
///
/// # Errors
///
/// See [`decode`].
pub fn parse_token(value: &str, verifier: &dyn Verifier) -> Result<Token, ValidationError> {
    let (header, claims) = decode(value, verifier)?;
    claims.into_token(header.alg, value.to_string())
}
