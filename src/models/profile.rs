// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Owner-scoped SSH credential bundle.
///
/// `secret` and `private_key` hold ciphertext produced by the secret store;
/// neither ciphertext nor plaintext ever leaves the process through the
/// serialized form.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub secret: String,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    pub port: u16,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload. Secret fields must already be encrypted.
#[derive(Debug, Clone)]
pub struct NewCredentialProfile {
    pub name: String,
    pub username: String,
    pub secret: String,
    pub private_key: Option<String>,
    pub port: u16,
    pub owner_id: Uuid,
}

/// Partial update for any non-id field; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct CredentialProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
    /// `Some(None)` clears the stored key.
    pub private_key: Option<Option<String>>,
    pub port: Option<u16>,
}
