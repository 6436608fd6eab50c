// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::IpAddr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, types::ipnetwork::IpNetwork};
use uuid::Uuid;

use crate::models::device::{Device, DeviceStatus, DeviceUpdate, NewDevice};

/// Discovered device rows.
///
/// Ownership is enforced by joining through `credential_profiles` on the
/// profile link and filtering by its owner; a write that touches a
/// non-owned row reports "no match", which callers surface as `NotFound`.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    hostname: String,
    ip_address: IpNetwork,
    device_type: String,
    os_info: Option<serde_json::Value>,
    credential_profile_id: Uuid,
    discovered_by_job: Option<Uuid>,
    status: String,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = anyhow::Error;

    fn try_from(row: DeviceRow) -> Result<Self> {
        let ip_address = match row.ip_address.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => bail!("device {} has a non-IPv4 address {v6}", row.id),
        };
        let device_type = row
            .device_type
            .parse()
            .with_context(|| format!("device {} has a corrupt type column", row.id))?;
        let status = row
            .status
            .parse()
            .with_context(|| format!("device {} has a corrupt status column", row.id))?;
        Ok(Device {
            id: row.id,
            hostname: row.hostname,
            ip_address,
            device_type,
            os_info: row.os_info,
            credential_profile_id: row.credential_profile_id,
            discovered_by_job: row.discovered_by_job,
            status,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_DEVICE: &str = "SELECT d.id, d.hostname, d.ip_address, d.device_type, \
                             d.os_info, d.credential_profile_id, d.discovered_by_job, \
                             d.status, d.last_seen, d.created_at, d.updated_at \
                             FROM devices d JOIN credential_profiles cp \
                             ON cp.id = d.credential_profile_id";

impl DeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a freshly probed host on `(credential_profile_id,
    /// ip_address)`; a re-scan refreshes facts, status, job link, and
    /// `last_seen` instead of accumulating duplicate rows.
    pub async fn insert_discovered(&self, device: &NewDevice) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO devices (id, hostname, ip_address, device_type, os_info, \
             credential_profile_id, discovered_by_job, status, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
             ON CONFLICT (credential_profile_id, ip_address) DO UPDATE SET \
             hostname = EXCLUDED.hostname, device_type = EXCLUDED.device_type, \
             os_info = EXCLUDED.os_info, discovered_by_job = EXCLUDED.discovered_by_job, \
             status = EXCLUDED.status, last_seen = now(), updated_at = now() \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&device.hostname)
        .bind(IpNetwork::from(IpAddr::V4(device.ip_address)))
        .bind(device.device_type.as_str())
        .bind(&device.os_info)
        .bind(device.credential_profile_id)
        .bind(device.discovered_by_job)
        .bind(device.status.as_str())
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert discovered device")?;
        Ok(id)
    }

    pub async fn get_for_owner(&self, id: Uuid, owner: Uuid) -> Result<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            &format!("{SELECT_DEVICE} WHERE d.id = $1 AND cp.owner_id = $2"),
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load device")?;
        row.map(Device::try_from).transpose()
    }

    pub async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            &format!("{SELECT_DEVICE} WHERE cp.owner_id = $1 ORDER BY d.ip_address"),
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("failed to list devices")?;
        rows.into_iter().map(Device::try_from).collect()
    }

    pub async fn list_for_owner_by_status(
        &self,
        status: DeviceStatus,
        owner: Uuid,
    ) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            &format!(
                "{SELECT_DEVICE} WHERE cp.owner_id = $1 AND d.status = $2 \
                 ORDER BY d.ip_address"
            ),
        )
        .bind(owner)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .context("failed to list devices by status")?;
        rows.into_iter().map(Device::try_from).collect()
    }

    /// Devices whose latest discovery belongs to the given job.
    pub async fn list_for_job(&self, job_id: Uuid, owner: Uuid) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            &format!(
                "{SELECT_DEVICE} WHERE cp.owner_id = $1 AND d.discovered_by_job = $2 \
                 ORDER BY d.ip_address"
            ),
        )
        .bind(owner)
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list devices for job")?;
        rows.into_iter().map(Device::try_from).collect()
    }

    /// LIKE-style match on hostname or the textual IP.
    pub async fn search(&self, term: &str, owner: Uuid) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            &format!(
                "{SELECT_DEVICE} WHERE cp.owner_id = $1 AND \
                 (d.hostname ILIKE '%' || $2 || '%' OR \
                 host(d.ip_address) LIKE '%' || $2 || '%') ORDER BY d.ip_address"
            ),
        )
        .bind(owner)
        .bind(term)
        .fetch_all(&self.pool)
        .await
        .context("failed to search devices")?;
        rows.into_iter().map(Device::try_from).collect()
    }

    /// Partial update; absent fields keep their stored value.
    pub async fn update(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: &DeviceUpdate,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE devices d SET \
             hostname = COALESCE($3, d.hostname), \
             device_type = COALESCE($4, d.device_type), \
             os_info = COALESCE($5, d.os_info), \
             status = COALESCE($6, d.status), \
             updated_at = now() \
             FROM credential_profiles cp \
             WHERE d.id = $1 AND cp.id = d.credential_profile_id AND cp.owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(patch.hostname.as_deref())
        .bind(patch.device_type.map(|t| t.as_str()))
        .bind(patch.os_info.as_ref())
        .bind(patch.status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .context("failed to update device")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        status: DeviceStatus,
        owner: Uuid,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE devices d SET status = $3, updated_at = now() \
             FROM credential_profiles cp \
             WHERE d.id = $1 AND cp.id = d.credential_profile_id AND cp.owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .context("failed to set device status")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "DELETE FROM devices d USING credential_profiles cp \
             WHERE d.id = $1 AND cp.id = d.credential_profile_id AND cp.owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .context("failed to delete device")?;
        Ok(res.rows_affected() == 1)
    }
}
