//! Discovery engine: job state machine, staged scan pipeline, and the
//! worker pool that isolates scan work from the request domain.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::{
    cfg::config::ScanConfig,
    models::{device::Device, job::DiscoveryJob},
    scan::cidr::CidrRange,
    secret::SecretBox,
    store::Stores,
};

/// Staged scan pipeline.
pub mod pipeline;
/// Discovery worker pool and control-plane request handling.
pub mod worker;

/// Error kinds surfaced by the discovery capability set.
///
/// `NotFound` deliberately covers both "absent" and "not yours": choosing
/// it over a Forbidden variant keeps foreign resources unobservable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource not found or not accessible")]
    NotFound,
    #[error("stored credentials could not be decrypted")]
    SecretCorrupt,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Wire code of this error kind. The front end maps these onto HTTP
    /// statuses (400 / 404 / 500).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::NotFound => "not_found",
            EngineError::SecretCorrupt => "secret_corrupt",
            EngineError::TransportFailure(_) => "transport_failure",
            EngineError::Internal(_) => "internal",
        }
    }
}

fn internal(e: anyhow::Error) -> EngineError {
    EngineError::Internal(format!("{e:#}"))
}

/// A request to scan one CIDR range with one credential profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartDiscovery {
    pub name: String,
    /// Target range in `A.B.C.D/prefix` form.
    pub target_range: String,
    /// Profile id as a string; parsed and ownership-checked server-side.
    pub credential_profile_id: String,
}

/// The discovery capability set.
///
/// Two behaviorally identical implementations exist: [`DiscoveryEngine`]
/// runs in-process inside a discovery worker, and
/// [`proxy::DiscoveryProxy`](crate::transport::proxy::DiscoveryProxy)
/// forwards over the control-plane transport. Assemblies pick one at
/// startup, never per call.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Validates the request, persists a `pending` job, kicks off the
    /// asynchronous pipeline, and returns the job id.
    async fn start_discovery(
        &self,
        req: StartDiscovery,
        owner: Uuid,
    ) -> Result<Uuid, EngineError>;

    async fn get_discovery_status(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<DiscoveryJob, EngineError>;

    /// Devices whose latest discovery belongs to the job.
    async fn get_discovery_results(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<Vec<Device>, EngineError>;

    /// Advisory cancellation: the job row flips to `failed` immediately,
    /// in-flight probes drain under their own timeouts.
    async fn cancel_discovery(&self, job_id: Uuid, owner: Uuid)
    -> Result<(), EngineError>;
}

/// In-process implementation of [`Discovery`], owned by the discovery
/// domain.
pub struct DiscoveryEngine {
    stores: Stores,
    secrets: SecretBox,
    scan: ScanConfig,
    /// Runtime the pipelines run on; always the discovery runtime.
    spawner: Handle,
    /// Cancellation handles of pipelines still in flight.
    running: Arc<DashMap<Uuid, CancellationToken>>,
}

impl DiscoveryEngine {
    pub fn new(stores: Stores, secrets: SecretBox, scan: ScanConfig, spawner: Handle) -> Self {
        Self {
            stores,
            secrets,
            scan,
            spawner,
            running: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl Discovery for DiscoveryEngine {
    async fn start_discovery(
        &self,
        req: StartDiscovery,
        owner: Uuid,
    ) -> Result<Uuid, EngineError> {
        let name = req.name.trim();
        let target_range = req.target_range.trim();
        let profile_ref = req.credential_profile_id.trim();

        if name.is_empty() {
            return Err(EngineError::InvalidArgument("name must not be blank".into()));
        }
        if target_range.is_empty() {
            return Err(EngineError::InvalidArgument(
                "targetRange must not be blank".into(),
            ));
        }
        if profile_ref.is_empty() {
            return Err(EngineError::InvalidArgument(
                "credentialProfileId must not be blank".into(),
            ));
        }

        let profile_id = Uuid::parse_str(profile_ref).map_err(|_| {
            EngineError::InvalidArgument("credentialProfileId is not a valid UUID".into())
        })?;
        let range: CidrRange = target_range
            .parse()
            .map_err(|e: crate::scan::cidr::CidrError| {
                EngineError::InvalidArgument(e.to_string())
            })?;

        if range.prefix() < self.scan.min_prefix && !self.scan.allow_large_ranges {
            return Err(EngineError::InvalidArgument(format!(
                "prefix /{} expands to too many hosts; shortest accepted prefix is /{}",
                range.prefix(),
                self.scan.min_prefix
            )));
        }

        let profile = self
            .stores
            .profiles
            .get_for_owner(profile_id, owner)
            .await
            .map_err(internal)?
            .ok_or(EngineError::NotFound)?;

        let job_id = self
            .stores
            .jobs
            .create(name, target_range, profile.id, owner)
            .await
            .map_err(internal)?;

        let cancel = CancellationToken::new();
        self.running.insert(job_id, cancel.clone());

        info!(job = %job_id, range = target_range, "discovery job accepted");
        self.spawner.spawn(pipeline::run(pipeline::PipelineCtx {
            job_id,
            profile,
            range,
            stores: self.stores.clone(),
            secrets: self.secrets.clone(),
            scan: self.scan.clone(),
            cancel,
            running: self.running.clone(),
        }));

        Ok(job_id)
    }

    async fn get_discovery_status(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<DiscoveryJob, EngineError> {
        self.stores
            .jobs
            .get_for_owner(job_id, owner)
            .await
            .map_err(internal)?
            .ok_or(EngineError::NotFound)
    }

    async fn get_discovery_results(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<Vec<Device>, EngineError> {
        let job = self
            .stores
            .jobs
            .get_for_owner(job_id, owner)
            .await
            .map_err(internal)?
            .ok_or(EngineError::NotFound)?;

        self.stores
            .devices
            .list_for_job(job.id, owner)
            .await
            .map_err(internal)
    }

    async fn cancel_discovery(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<(), EngineError> {
        let marker = json!({
            "cancelled": true,
            "cancelled_at": Utc::now().to_rfc3339(),
        });

        let flipped = self
            .stores
            .jobs
            .cancel(job_id, owner, &marker)
            .await
            .map_err(internal)?;
        if !flipped {
            // Terminal or foreign jobs look identical from the outside.
            return Err(EngineError::NotFound);
        }

        if let Some((_, token)) = self.running.remove(&job_id) {
            token.cancel();
        }
        info!(job = %job_id, "discovery job cancelled");
        Ok(())
    }
}
