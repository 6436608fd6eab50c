// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    engine::{Discovery, EngineError, StartDiscovery},
    models::{device::Device, job::DiscoveryJob},
    transport::{
        Bus, ChannelId, Fault,
        messages::{JobRequest, StartRequest},
    },
};

/// Transport-backed implementation of the discovery capability set.
///
/// This is what the request domain holds: every call serializes a payload,
/// suspends on exactly one reply, and never touches a socket or the
/// database itself. Behavior matches the in-process engine one-to-one.
#[derive(Debug, Clone)]
pub struct DiscoveryProxy {
    bus: Bus,
}

impl DiscoveryProxy {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

impl From<Fault> for EngineError {
    fn from(fault: Fault) -> Self {
        match fault.error.as_str() {
            "invalid_argument" => EngineError::InvalidArgument(fault.message),
            "not_found" => EngineError::NotFound,
            "secret_corrupt" => EngineError::SecretCorrupt,
            "internal" => EngineError::Internal(fault.message),
            _ => EngineError::TransportFailure(fault.message),
        }
    }
}

fn malformed_reply(what: &str) -> EngineError {
    EngineError::TransportFailure(format!("malformed worker reply: {what}"))
}

fn encode<T: serde::Serialize>(msg: &T) -> Result<Value, EngineError> {
    serde_json::to_value(msg)
        .map_err(|e| EngineError::TransportFailure(format!("failed to encode request: {e}")))
}

#[async_trait]
impl Discovery for DiscoveryProxy {
    async fn start_discovery(
        &self,
        req: StartDiscovery,
        owner: Uuid,
    ) -> Result<Uuid, EngineError> {
        let payload = encode(&StartRequest {
            request: req,
            owner_id: owner,
        })?;
        let reply = self.bus.request(ChannelId::Start, payload).await?;

        reply
            .get("jobId")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| malformed_reply("missing jobId"))
    }

    async fn get_discovery_status(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<DiscoveryJob, EngineError> {
        let payload = encode(&JobRequest {
            job_id,
            owner_id: owner,
        })?;
        let reply = self.bus.request(ChannelId::Status, payload).await?;

        let job = reply
            .get("job")
            .cloned()
            .ok_or_else(|| malformed_reply("missing job"))?;
        serde_json::from_value(job).map_err(|_| malformed_reply("undecodable job"))
    }

    async fn get_discovery_results(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<Vec<Device>, EngineError> {
        let payload = encode(&JobRequest {
            job_id,
            owner_id: owner,
        })?;
        let reply = self.bus.request(ChannelId::Results, payload).await?;

        let devices = reply
            .get("devices")
            .cloned()
            .ok_or_else(|| malformed_reply("missing devices"))?;
        serde_json::from_value(devices).map_err(|_| malformed_reply("undecodable devices"))
    }

    async fn cancel_discovery(
        &self,
        job_id: Uuid,
        owner: Uuid,
    ) -> Result<(), EngineError> {
        let payload = encode(&JobRequest {
            job_id,
            owner_id: owner,
        })?;
        self.bus.request(ChannelId::Cancel, payload).await?;
        Ok(())
    }
}
