//! Envelope encryption for provider access tokens at rest.
//!
//! Current envelopes look like `v2:<nonce>.<ciphertext>.<tag>` (base64url,
//! ChaCha20-Poly1305, 256-bit key, 96-bit random nonce). Two legacy formats are
//! still readable so stored credentials can be migrated lazily:
//! - `v1:<base64url("<raw key>:<token>")>`, keyed obfuscation without authentication
//! - `plain:<token>`, written before encryption was configured

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Environment variable holding the base64-encoded 32-byte vault key.
pub const TOKEN_ENCRYPTION_KEY_ENV: &str = "TOKEN_ENCRYPTION_KEY";

const CURRENT_PREFIX: &str = "v2:";
const LEGACY_V1_PREFIX: &str = "v1:";
const LEGACY_PLAIN_PREFIX: &str = "plain:";

const KEY_LENGTH_BYTES: usize = 32;
const NONCE_LENGTH_BYTES: usize = 12;
const TAG_LENGTH_BYTES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("TOKEN_ENCRYPTION_KEY is required")]
    MissingKey,

    #[error("TOKEN_ENCRYPTION_KEY must be base64-encoded")]
    InvalidKeyEncoding,

    #[error("TOKEN_ENCRYPTION_KEY must decode to 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Malformed credential envelope: {0}")]
    MalformedEnvelope(&'static str),

    #[error("Unsupported credential envelope format")]
    UnsupportedFormat,

    #[error("Credential envelope failed authentication")]
    Tampered,

    #[error("Legacy credential envelope was written with a different key")]
    KeyMismatch,

    #[error("Failed to encrypt credential")]
    EncryptionFailed,
}

/// Closed set of envelope formats the vault can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeFormat {
    Current {
        nonce: [u8; NONCE_LENGTH_BYTES],
        ciphertext: Vec<u8>,
        tag: [u8; TAG_LENGTH_BYTES],
    },
    LegacyV1 {
        decoded: Vec<u8>,
    },
    LegacyPlain {
        token: String,
    },
}

impl EnvelopeFormat {
    /// Parses the version prefix and segment structure without touching key material.
    pub fn parse(envelope: &str) -> Result<Self, VaultError> {
        if let Some(body) = envelope.strip_prefix(CURRENT_PREFIX) {
            let mut segments = body.split('.');
            let (Some(nonce), Some(ciphertext), Some(tag), None) = (
                segments.next(),
                segments.next(),
                segments.next(),
                segments.next(),
            ) else {
                return Err(VaultError::MalformedEnvelope("expected three segments"));
            };
            if nonce.is_empty() || tag.is_empty() {
                return Err(VaultError::MalformedEnvelope("empty nonce or tag segment"));
            }

            let nonce = decode_segment(nonce)?;
            let ciphertext = decode_segment(ciphertext)?;
            let tag = decode_segment(tag)?;

            let nonce: [u8; NONCE_LENGTH_BYTES] = nonce
                .try_into()
                .map_err(|_| VaultError::MalformedEnvelope("nonce must be 12 bytes"))?;
            let tag: [u8; TAG_LENGTH_BYTES] = tag
                .try_into()
                .map_err(|_| VaultError::MalformedEnvelope("tag must be 16 bytes"))?;

            return Ok(Self::Current {
                nonce,
                ciphertext,
                tag,
            });
        }

        if let Some(body) = envelope.strip_prefix(LEGACY_V1_PREFIX) {
            return Ok(Self::LegacyV1 {
                decoded: decode_segment(body)?,
            });
        }

        if let Some(token) = envelope.strip_prefix(LEGACY_PLAIN_PREFIX) {
            return Ok(Self::LegacyPlain {
                token: token.to_string(),
            });
        }

        Err(VaultError::UnsupportedFormat)
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, Self::Current { .. })
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, VaultError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| VaultError::MalformedEnvelope("segment is not base64url"))
}

/// Plaintext recovered from an envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedCredential {
    pub token: String,
    /// True when the envelope was not in the current format and should be rewritten.
    pub was_legacy_format: bool,
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("token", &"<redacted>")
            .field("was_legacy_format", &self.was_legacy_format)
            .finish()
    }
}

/// Encrypts and decrypts provider access tokens.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
    raw_secret: String,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Builds a vault from the base64-encoded 32-byte secret.
    pub fn new(encoded_key: &str) -> Result<Self, VaultError> {
        let raw_secret = encoded_key.trim();
        if raw_secret.is_empty() {
            return Err(VaultError::MissingKey);
        }

        let key = STANDARD
            .decode(raw_secret)
            .map_err(|_| VaultError::InvalidKeyEncoding)?;
        if key.len() != KEY_LENGTH_BYTES {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            raw_secret: raw_secret.to_string(),
        })
    }

    /// Reads the key from `TOKEN_ENCRYPTION_KEY`.
    pub fn from_env() -> Result<Self, VaultError> {
        let raw = std::env::var(TOKEN_ENCRYPTION_KEY_ENV).map_err(|_| VaultError::MissingKey)?;
        Self::new(&raw)
    }

    /// Encrypts a token into a current-format envelope with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH_BYTES];
        OsRng.fill_bytes(&mut nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH_BYTES);

        Ok(format!(
            "{}{}.{}.{}",
            CURRENT_PREFIX,
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Decrypts any supported envelope, reporting whether it was a legacy format.
    pub fn decrypt(&self, envelope: &str) -> Result<DecryptedCredential, VaultError> {
        match EnvelopeFormat::parse(envelope)? {
            EnvelopeFormat::Current {
                nonce,
                ciphertext,
                tag,
            } => {
                let mut sealed = ciphertext;
                sealed.extend_from_slice(&tag);
                let plaintext = self
                    .cipher
                    .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
                    .map_err(|_| VaultError::Tampered)?;
                let token = String::from_utf8(plaintext)
                    .map_err(|_| VaultError::MalformedEnvelope("plaintext is not UTF-8"))?;
                Ok(DecryptedCredential {
                    token,
                    was_legacy_format: false,
                })
            }
            EnvelopeFormat::LegacyV1 { decoded } => {
                let decoded = String::from_utf8(decoded)
                    .map_err(|_| VaultError::MalformedEnvelope("legacy payload is not UTF-8"))?;
                let token = decoded
                    .strip_prefix(self.raw_secret.as_str())
                    .and_then(|rest| rest.strip_prefix(':'))
                    .ok_or(VaultError::KeyMismatch)?;
                Ok(DecryptedCredential {
                    token: token.to_string(),
                    was_legacy_format: true,
                })
            }
            EnvelopeFormat::LegacyPlain { token } => Ok(DecryptedCredential {
                token,
                was_legacy_format: true,
            }),
        }
    }
}
