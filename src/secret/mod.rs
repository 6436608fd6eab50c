// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Credential secret store.
//!
//! Profile passwords and private keys are kept AEAD-encrypted at rest and
//! decrypted only inside discovery workers. The ciphertext layout is
//! `nonce || ct || tag`, base64-encoded; a fresh 96-bit nonce is drawn per
//! operation and the 128-bit tag authenticates the whole message.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use thiserror::Error;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    /// The configured key does not decode under any accepted base64 variant.
    #[error("encryption key is not valid base64")]
    KeyNotBase64,
    /// The configured key decodes to the wrong number of bytes.
    #[error("encryption key must decode to {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),
    /// Undecodable, truncated, or tampered ciphertext. Details are never
    /// attached; callers log a generic message.
    #[error("secret ciphertext is corrupt")]
    Corrupt,
}

/// Symmetric secret box shared by every store that persists credentials.
///
/// Cloning is cheap; all clones share the same key schedule.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material must never reach logs.
        f.write_str("SecretBox")
    }
}

impl SecretBox {
    /// Builds a secret box from a base64-encoded 256-bit key.
    ///
    /// The decode fallback chain accepts standard base64, URL-safe base64,
    /// and standard base64 with broken padding. Anything else is a startup
    /// error.
    pub fn from_key_b64(key_b64: &str) -> Result<Self, SecretError> {
        let raw = decode_key(key_b64.trim())?;
        if raw.len() != KEY_LEN {
            return Err(SecretError::KeyLength(raw.len()));
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&raw));
        Ok(Self { cipher })
    }

    /// Encrypts a plaintext into `base64(nonce || ct || tag)`.
    ///
    /// Empty input round-trips unchanged so optional fields stay optional.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ct = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Corrupt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(STANDARD.encode(out))
    }

    /// Decrypts a `base64(nonce || ct || tag)` payload.
    ///
    /// Any defect (bad base64, payload shorter than a nonce, tag mismatch,
    /// non-UTF-8 plaintext) collapses into [`SecretError::Corrupt`].
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, SecretError> {
        if ciphertext_b64.is_empty() {
            return Ok(String::new());
        }

        let raw = STANDARD
            .decode(ciphertext_b64)
            .map_err(|_| SecretError::Corrupt)?;
        if raw.len() < NONCE_LEN {
            return Err(SecretError::Corrupt);
        }

        let (nonce, ct) = raw.split_at(NONCE_LEN);
        let pt = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| SecretError::Corrupt)?;

        String::from_utf8(pt).map_err(|_| SecretError::Corrupt)
    }
}

/// Key decode fallback chain: standard base64, then URL-safe base64, then
/// standard base64 after padding normalization.
fn decode_key(s: &str) -> Result<Vec<u8>, SecretError> {
    if let Ok(v) = STANDARD.decode(s) {
        return Ok(v);
    }
    if let Ok(v) = URL_SAFE.decode(s) {
        return Ok(v);
    }

    let trimmed = s.trim_end_matches('=');
    let mut padded = trimmed.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    STANDARD.decode(padded).map_err(|_| SecretError::KeyNotBase64)
}
