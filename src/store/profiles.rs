// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, anyhow, ensure};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::profile::{
    CredentialProfile, CredentialProfileUpdate, NewCredentialProfile,
};

/// Postgres error code for a foreign-key violation.
const FK_VIOLATION: &str = "23503";

/// Credential profile rows. Secret columns always hold ciphertext; the
/// store never sees plaintext.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    name: String,
    username: String,
    secret: String,
    private_key: Option<String>,
    port: i32,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for CredentialProfile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        ensure!(
            (1..=i32::from(u16::MAX)).contains(&row.port),
            "profile {} has an out-of-range port {}",
            row.id,
            row.port
        );
        Ok(CredentialProfile {
            id: row.id,
            name: row.name,
            username: row.username,
            secret: row.secret,
            private_key: row.private_key,
            port: row.port as u16,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_PROFILE: &str = "SELECT id, name, username, secret, private_key, port, \
                              owner_id, created_at, updated_at FROM credential_profiles";

impl ProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, profile: &NewCredentialProfile) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO credential_profiles (id, name, username, secret, \
             private_key, port, owner_id) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(&profile.name)
        .bind(&profile.username)
        .bind(&profile.secret)
        .bind(profile.private_key.as_deref())
        .bind(i32::from(profile.port))
        .bind(profile.owner_id)
        .execute(&self.pool)
        .await
        .context("failed to insert credential profile")?;
        Ok(id)
    }

    pub async fn get_for_owner(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<CredentialProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            &format!("{SELECT_PROFILE} WHERE id = $1 AND owner_id = $2"),
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load credential profile")?;
        row.map(CredentialProfile::try_from).transpose()
    }

    pub async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<CredentialProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            &format!("{SELECT_PROFILE} WHERE owner_id = $1 ORDER BY name"),
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("failed to list credential profiles")?;
        rows.into_iter().map(CredentialProfile::try_from).collect()
    }

    /// Partial update of any non-id field. The private key is tri-state:
    /// absent keeps it, `Some(None)` clears it, `Some(Some(..))` replaces
    /// it.
    pub async fn update(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: &CredentialProfileUpdate,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE credential_profiles SET \
             name = COALESCE($3, name), \
             username = COALESCE($4, username), \
             secret = COALESCE($5, secret), \
             private_key = CASE WHEN $6 THEN $7 ELSE private_key END, \
             port = COALESCE($8, port), \
             updated_at = now() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(patch.name.as_deref())
        .bind(patch.username.as_deref())
        .bind(patch.secret.as_deref())
        .bind(patch.private_key.is_some())
        .bind(patch.private_key.clone().flatten())
        .bind(patch.port.map(i32::from))
        .execute(&self.pool)
        .await
        .context("failed to update credential profile")?;
        Ok(res.rows_affected() == 1)
    }

    /// Deletes an owned profile. Restricted: fails while devices or jobs
    /// still reference it.
    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "DELETE FROM credential_profiles WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(e) => {
                let referenced = e
                    .as_database_error()
                    .and_then(|dbe| dbe.code())
                    .is_some_and(|code| code == FK_VIOLATION);
                if referenced {
                    Err(anyhow!(
                        "credential profile {id} is still referenced by devices or jobs"
                    ))
                } else {
                    Err(e).context("failed to delete credential profile")
                }
            },
        }
    }
}
