// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The staged scan pipeline of one discovery job.
//!
//! Stages run in order (liveness, TCP port, SSH), each fanning out over
//! its survivors under a shared concurrency cap. Per-host failures are
//! logged and dropped; only orchestration failures (credential decrypt,
//! job-row writes) fail the job. Every terminal write is a compare-and-set
//! against the job-status state machine, so a drained pipeline can never
//! overwrite a cancellation marker.

use std::{net::Ipv4Addr, sync::Arc};

use anyhow::{Result, anyhow};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    cfg::config::ScanConfig,
    models::{
        device::{DeviceStatus, NewDevice},
        profile::CredentialProfile,
    },
    scan::{
        cidr::CidrRange,
        liveness::LivenessProber,
        port::PortProber,
        ssh::{SshCredentials, SshProber},
    },
    secret::SecretBox,
    store::Stores,
};

/// Everything one pipeline run owns.
pub(crate) struct PipelineCtx {
    pub job_id: Uuid,
    pub profile: CredentialProfile,
    pub range: CidrRange,
    pub stores: Stores,
    pub secrets: SecretBox,
    pub scan: ScanConfig,
    pub cancel: CancellationToken,
    /// Registry shared with the engine; this run deregisters itself on exit.
    pub running: Arc<DashMap<Uuid, CancellationToken>>,
}

/// Drives the pipeline to a terminal job state. Never propagates errors:
/// an orchestration failure is recorded into the job row instead.
pub(crate) async fn run(ctx: PipelineCtx) {
    let job_id = ctx.job_id;

    if let Err(e) = drive(&ctx).await {
        warn!(job = %job_id, error = %format!("{e:#}"), "discovery job failed");
        let summary = json!({
            "error": format!("{e:#}"),
            "failedAt": Utc::now().to_rfc3339(),
        });
        match ctx.stores.jobs.set_failed(job_id, &summary).await {
            Ok(true) => {},
            Ok(false) => {
                debug!(job = %job_id, "job already terminal; failure summary dropped")
            },
            Err(e) => {
                error!(job = %job_id, error = %format!("{e:#}"), "could not record job failure")
            },
        }
    }

    ctx.running.remove(&job_id);
}

async fn drive(ctx: &PipelineCtx) -> Result<()> {
    let started = ctx.stores.jobs.set_running(ctx.job_id).await?;
    if !started {
        // Cancelled between insert and pickup; nothing to scan.
        info!(job = %ctx.job_id, "job is no longer pending, skipping scan");
        return Ok(());
    }

    // Secrets are decrypted here, inside the worker, and nowhere else.
    // Decrypt failures surface with a generic message only.
    let password = ctx
        .secrets
        .decrypt(&ctx.profile.secret)
        .map_err(|_| anyhow!("credential secret could not be decrypted"))?;
    let private_key = match &ctx.profile.private_key {
        Some(ciphertext) => Some(
            ctx.secrets
                .decrypt(ciphertext)
                .map_err(|_| anyhow!("credential private key could not be decrypted"))?,
        ),
        None => None,
    };
    let creds = SshCredentials {
        username: ctx.profile.username.clone(),
        password,
        private_key,
        port: ctx.profile.port,
    };

    let candidates: Vec<Ipv4Addr> = ctx.range.usable_hosts().collect();
    let total_scanned = candidates.len();
    info!(
        job = %ctx.job_id,
        range = %ctx.range,
        candidates = total_scanned,
        "scan started"
    );

    let cap = ctx.scan.max_concurrent_probes;

    let alive = if candidates.is_empty() || ctx.cancel.is_cancelled() {
        Vec::new()
    } else {
        LivenessProber::new(ctx.scan.liveness_timeout, cap)
            .sweep(&candidates, creds.port)
            .await
    };

    let open = if alive.is_empty() || ctx.cancel.is_cancelled() {
        Vec::new()
    } else {
        PortProber::new(ctx.scan.port_timeout, cap)
            .sweep(&alive, creds.port)
            .await
    };

    let probed = if open.is_empty() || ctx.cancel.is_cancelled() {
        Vec::new()
    } else {
        SshProber::new(ctx.scan.ssh_timeout, cap)
            .sweep(&open, &creds)
            .await
    };

    // Probes that drained past a cancellation still record their device;
    // the conditional completion write below keeps the job row honest.
    let mut hostnames = Vec::with_capacity(probed.len());
    for (addr, facts) in probed {
        let device = NewDevice {
            hostname: facts.hostname.clone(),
            ip_address: addr,
            device_type: facts.device_type(),
            os_info: serde_json::to_value(&facts)?,
            credential_profile_id: ctx.profile.id,
            discovered_by_job: Some(ctx.job_id),
            status: DeviceStatus::Online,
        };
        match ctx.stores.devices.insert_discovered(&device).await {
            Ok(_) => hostnames.push(facts.hostname),
            Err(e) => warn!(
                job = %ctx.job_id,
                host = %addr,
                error = %format!("{e:#}"),
                "device row insert failed"
            ),
        }
    }

    let discovered = hostnames.len();
    let summary = json!({
        "totalIpsScanned": total_scanned,
        "devicesDiscovered": discovered,
        "devices": hostnames,
    });

    let completed = ctx.stores.jobs.set_completed(ctx.job_id, &summary).await?;
    if completed {
        info!(
            job = %ctx.job_id,
            scanned = total_scanned,
            discovered,
            "discovery job completed"
        );
    } else {
        info!(
            job = %ctx.job_id,
            "job was cancelled while the scan drained; completion summary dropped"
        );
    }
    Ok(())
}
