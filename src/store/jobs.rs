// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::job::DiscoveryJob;

/// Durable record of each discovery job.
///
/// Status transitions are compare-and-set updates so that a pipeline
/// writing its summary can never clobber a cancellation marker, and a
/// cancelled job can never re-enter `running`.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    status: String,
    target_range: String,
    credential_profile_id: Uuid,
    results: Option<serde_json::Value>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for DiscoveryJob {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .with_context(|| format!("job {} has a corrupt status column", row.id))?;
        Ok(DiscoveryJob {
            id: row.id,
            name: row.name,
            status,
            target_range: row.target_range,
            credential_profile_id: row.credential_profile_id,
            results: row.results,
            created_by: row.created_by,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, name, status, target_range, \
                          credential_profile_id, results, created_by, \
                          created_at, started_at, completed_at FROM \
                          discovery_jobs";

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a `pending` job row and returns its id.
    pub async fn create(
        &self,
        name: &str,
        target_range: &str,
        credential_profile_id: Uuid,
        created_by: Uuid,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO discovery_jobs (id, name, status, target_range, \
             credential_profile_id, created_by) VALUES ($1, $2, 'pending', $3, $4, $5)",
        )
        .bind(id)
        .bind(name)
        .bind(target_range)
        .bind(credential_profile_id)
        .bind(created_by)
        .execute(&self.pool)
        .await
        .context("failed to insert discovery job")?;
        Ok(id)
    }

    /// `pending -> running`, stamping `started_at`. False when the job was
    /// cancelled (or otherwise left `pending`) first.
    pub async fn set_running(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE discovery_jobs SET status = 'running', started_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark job running")?;
        Ok(res.rows_affected() == 1)
    }

    /// `running -> completed`, rewriting the summary. False when the job is
    /// no longer `running`: a drained scan must keep the cancellation
    /// marker it finds there.
    pub async fn set_completed(
        &self,
        id: Uuid,
        summary: &serde_json::Value,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE discovery_jobs SET status = 'completed', results = $2, \
             completed_at = now() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(summary)
        .execute(&self.pool)
        .await
        .context("failed to mark job completed")?;
        Ok(res.rows_affected() == 1)
    }

    /// Non-terminal -> `failed`, rewriting the summary with the failure
    /// record. A job already failed (including by cancellation) is left
    /// untouched.
    pub async fn set_failed(&self, id: Uuid, summary: &serde_json::Value) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE discovery_jobs SET status = 'failed', results = $2, \
             started_at = COALESCE(started_at, now()), completed_at = now() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(summary)
        .execute(&self.pool)
        .await
        .context("failed to mark job failed")?;
        Ok(res.rows_affected() == 1)
    }

    /// Advisory cancellation: flips a pending/running owned job to `failed`
    /// and writes the cancellation marker as the summary. False when the
    /// job is terminal or not visible to the owner.
    pub async fn cancel(
        &self,
        id: Uuid,
        owner: Uuid,
        marker: &serde_json::Value,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE discovery_jobs SET status = 'failed', results = $3, \
             started_at = COALESCE(started_at, now()), completed_at = now() \
             WHERE id = $1 AND created_by = $2 \
             AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(owner)
        .bind(marker)
        .execute(&self.pool)
        .await
        .context("failed to cancel job")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn get_for_owner(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<DiscoveryJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            &format!("{SELECT_JOB} WHERE id = $1 AND created_by = $2"),
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load discovery job")?;
        row.map(DiscoveryJob::try_from).transpose()
    }

    pub async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<DiscoveryJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            &format!("{SELECT_JOB} WHERE created_by = $1 ORDER BY created_at DESC"),
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("failed to list discovery jobs")?;
        rows.into_iter().map(DiscoveryJob::try_from).collect()
    }
}
