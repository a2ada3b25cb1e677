//! Verification of provider-signed webhook tokens.
//!
//! The token is a compact JWS (`header.payload.signature`) signed with ES256.
//! Structural and claim checks run before the key lookup and signature check;
//! the body hash is compared last so a valid signature issued for a different
//! body is still rejected.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use log::{debug, warn};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::{VerificationKey, VerificationKeySource};
use crate::provider::ProviderError;

/// Header carrying the signed verification token.
pub const VERIFICATION_HEADER: &str = "plaid-verification";

/// Only signing algorithm accepted for webhook tokens and keys.
pub const WEBHOOK_SIGNING_ALGORITHM: &str = "ES256";

/// Oldest accepted token, measured from `iat`.
pub const MAX_TOKEN_AGE_SECS: i64 = 5 * 60;

/// Accepted clock skew for tokens issued slightly in the future.
pub const MAX_FUTURE_SKEW_SECS: i64 = 30;

const BODY_HASH_CLAIM: &str = "request_body_sha256";
const ISSUED_AT_CLAIM: &str = "iat";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Missing verification header")]
    MissingHeader,

    #[error("Malformed verification token: {0}")]
    MalformedToken(&'static str),

    #[error("Unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("Verification token has no key id")]
    MissingKeyId,

    #[error("Verification token is missing the '{0}' claim")]
    MissingClaim(&'static str),

    #[error("Verification token outside allowed age window ({age_secs}s)")]
    StaleToken { age_secs: i64 },

    #[error("Unknown verification key '{0}'")]
    UnknownKeyId(String),

    #[error("Verification key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Verification key lookup unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook body hash mismatch")]
    BodyHashMismatch,
}

impl VerificationError {
    /// `true` when the delivery itself failed authentication, as opposed to a
    /// lookup outage on our side that the provider should retry.
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(self, Self::KeyUnavailable(_))
    }
}

/// Claims the verifier needs from a token, extracted before any crypto runs.
#[derive(Debug)]
struct TokenParts<'a> {
    signing_input: &'a str,
    signature: &'a str,
    key_id: String,
    body_hash: String,
    issued_at: i64,
}

pub struct WebhookVerifier {
    key_source: Arc<dyn VerificationKeySource>,
}

impl WebhookVerifier {
    pub fn new(key_source: Arc<dyn VerificationKeySource>) -> Self {
        Self { key_source }
    }

    pub async fn verify(&self, body: &[u8], token: Option<&str>) -> Result<(), VerificationError> {
        self.verify_at(body, token, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        body: &[u8],
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let token = token
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(VerificationError::MissingHeader)?;

        let parts = parse_token(token)?;

        let age_secs = now.timestamp() - parts.issued_at;
        if !(-MAX_FUTURE_SKEW_SECS..=MAX_TOKEN_AGE_SECS).contains(&age_secs) {
            return Err(VerificationError::StaleToken { age_secs });
        }

        let key = self
            .key_source
            .get_verification_key(&parts.key_id)
            .await
            .map_err(|err| key_lookup_error(&parts.key_id, err))?;
        let decoding_key = decoding_key_for(&key)?;

        let signature_valid = jsonwebtoken::crypto::verify(
            parts.signature,
            parts.signing_input.as_bytes(),
            &decoding_key,
            Algorithm::ES256,
        )
        .unwrap_or(false);
        if !signature_valid {
            return Err(VerificationError::InvalidSignature);
        }

        let computed = hex::encode(Sha256::digest(body));
        if !bool::from(computed.as_bytes().ct_eq(parts.body_hash.as_bytes())) {
            return Err(VerificationError::BodyHashMismatch);
        }

        debug!("[Webhook] Verified delivery signed with key {}", parts.key_id);
        Ok(())
    }
}

fn parse_token(token: &str) -> Result<TokenParts<'_>, VerificationError> {
    let segments: Vec<&str> = token.split('.').collect();
    let &[header, payload, signature] = segments.as_slice() else {
        return Err(VerificationError::MalformedToken("expected three segments"));
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(VerificationError::MalformedToken("empty segment"));
    }

    let header_json = decode_json_segment(header, "header is not base64url JSON")?;
    let algorithm = header_json.get("alg").and_then(Value::as_str);
    if algorithm != Some(WEBHOOK_SIGNING_ALGORITHM) {
        return Err(VerificationError::UnsupportedAlgorithm(
            algorithm.unwrap_or("none").to_string(),
        ));
    }

    let key_id = header_json
        .get("kid")
        .and_then(Value::as_str)
        .filter(|kid| !kid.is_empty())
        .ok_or(VerificationError::MissingKeyId)?
        .to_string();

    let payload_json = decode_json_segment(payload, "payload is not base64url JSON")?;
    let body_hash = payload_json
        .get(BODY_HASH_CLAIM)
        .and_then(Value::as_str)
        .filter(|hash| !hash.is_empty())
        .ok_or(VerificationError::MissingClaim(BODY_HASH_CLAIM))?
        .to_string();
    let issued_at = payload_json
        .get(ISSUED_AT_CLAIM)
        .and_then(Value::as_f64)
        .filter(|iat| iat.is_finite())
        .ok_or(VerificationError::MissingClaim(ISSUED_AT_CLAIM))?
        .floor() as i64;

    let signing_input_len = header.len() + 1 + payload.len();
    Ok(TokenParts {
        signing_input: &token[..signing_input_len],
        signature,
        key_id,
        body_hash,
        issued_at,
    })
}

fn decode_json_segment(segment: &str, reason: &'static str) -> Result<Value, VerificationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| VerificationError::MalformedToken(reason))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|_| VerificationError::MalformedToken(reason))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(VerificationError::MalformedToken(reason))
    }
}

fn decoding_key_for(key: &VerificationKey) -> Result<DecodingKey, VerificationError> {
    if key.alg != WEBHOOK_SIGNING_ALGORITHM {
        return Err(VerificationError::KeyMismatch(format!(
            "key algorithm '{}'",
            key.alg
        )));
    }
    if key.kty != "EC" || key.crv != "P-256" {
        return Err(VerificationError::KeyMismatch(format!(
            "key type '{}' on curve '{}'",
            key.kty, key.crv
        )));
    }
    DecodingKey::from_ec_components(&key.x, &key.y)
        .map_err(|err| VerificationError::KeyMismatch(format!("invalid EC key: {}", err)))
}

fn key_lookup_error(key_id: &str, err: ProviderError) -> VerificationError {
    match err.http_status {
        Some(status) if (400..500).contains(&status) && status != 429 => {
            VerificationError::UnknownKeyId(key_id.to_string())
        }
        _ => {
            warn!(
                "[Webhook] Verification key lookup failed for {}: {}",
                key_id, err
            );
            VerificationError::KeyUnavailable(err.to_string())
        }
    }
}
