// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The discovery worker pool.
//!
//! Scan work blocks on sockets, SSH sessions, and the database, so it runs
//! on a dedicated multi-thread runtime sized `instances * poolSize`,
//! completely isolated from the request domain's scheduler. Every worker
//! task pulls requests from the shared mailbox (first idle worker wins),
//! handles them against the in-process engine, and answers through the
//! envelope's completion handle.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cfg::config::WorkerConfig,
    engine::{Discovery, DiscoveryEngine, EngineError},
    transport::{
        ChannelId, Fault, Mailbox, Reply, Request,
        messages::{JobRequest, StartRequest, success_reply},
    },
};

/// The discovery scheduling domain: a runtime plus its consumer tasks.
pub struct WorkerGroup {
    runtime: Option<Runtime>,
    stop: CancellationToken,
    workers: usize,
}

impl WorkerGroup {
    /// Builds the discovery runtime. No worker consumes requests until
    /// [`WorkerGroup::serve`] is called.
    pub fn new(cfg: &WorkerConfig) -> Result<Self> {
        let workers = cfg.total_workers();
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("netwarden-discovery")
            .enable_all()
            .build()
            .context("failed to build the discovery runtime")?;

        Ok(Self {
            runtime: Some(runtime),
            stop: CancellationToken::new(),
            workers,
        })
    }

    /// Handle for spawning pipeline work onto the discovery runtime.
    pub fn handle(&self) -> Handle {
        self.runtime
            .as_ref()
            .expect("discovery runtime torn down")
            .handle()
            .clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns one consumer task per worker, all draining the same mailbox.
    pub fn serve(&self, engine: Arc<DiscoveryEngine>, mailbox: Mailbox) {
        info!(workers = self.workers, "starting discovery workers");
        for idx in 0..self.workers {
            let engine = engine.clone();
            let mailbox = mailbox.clone();
            let stop = self.stop.clone();
            self.handle().spawn(consume(idx, engine, mailbox, stop));
        }
    }

    /// Stops the consumers and tears the runtime down without blocking the
    /// caller's scheduler. In-flight pipelines are dropped.
    pub fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

async fn consume(
    idx: usize,
    engine: Arc<DiscoveryEngine>,
    mailbox: Mailbox,
    stop: CancellationToken,
) {
    debug!(worker = idx, "discovery worker ready");
    loop {
        // Hold the mailbox lock only while waiting for the next message,
        // never while handling one.
        let envelope = {
            let mut rx = mailbox.lock().await;
            tokio::select! {
                _ = stop.cancelled() => None,
                msg = rx.recv() => msg,
            }
        };
        let Some(envelope) = envelope else {
            break;
        };

        let reply = handle_request(engine.as_ref(), envelope.request).await;
        if envelope.reply_tx.send(reply).is_err() {
            debug!(worker = idx, "caller abandoned its reply");
        }
    }
    debug!(worker = idx, "discovery worker stopped");
}

/// Dispatches one control-plane request to the in-process engine.
pub async fn handle_request(engine: &DiscoveryEngine, request: Request) -> Reply {
    match request.channel {
        ChannelId::Start => {
            let msg: StartRequest = decode(request.payload)?;
            let job_id = engine
                .start_discovery(msg.request, msg.owner_id)
                .await
                .map_err(fault_of)?;
            Ok(success_reply(json!({ "jobId": job_id })))
        },
        ChannelId::Status => {
            let msg: JobRequest = decode(request.payload)?;
            let job = engine
                .get_discovery_status(msg.job_id, msg.owner_id)
                .await
                .map_err(fault_of)?;
            Ok(success_reply(json!({ "job": job })))
        },
        ChannelId::Results => {
            let msg: JobRequest = decode(request.payload)?;
            let devices = engine
                .get_discovery_results(msg.job_id, msg.owner_id)
                .await
                .map_err(fault_of)?;
            Ok(success_reply(json!({
                "count": devices.len(),
                "devices": devices,
            })))
        },
        ChannelId::Cancel => {
            let msg: JobRequest = decode(request.payload)?;
            engine
                .cancel_discovery(msg.job_id, msg.owner_id)
                .await
                .map_err(fault_of)?;
            Ok(success_reply(json!({})))
        },
    }
}

fn decode<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, Fault> {
    serde_json::from_value(payload).map_err(|e| Fault {
        error: "invalid_argument".to_string(),
        message: format!("malformed request payload: {e}"),
    })
}

/// Lowers an engine error onto the wire, keeping the specific message for
/// the variants that carry one.
fn fault_of(e: EngineError) -> Fault {
    let message = match &e {
        EngineError::InvalidArgument(m)
        | EngineError::TransportFailure(m)
        | EngineError::Internal(m) => m.clone(),
        EngineError::NotFound | EngineError::SecretCorrupt => e.to_string(),
    };
    Fault {
        error: e.code().to_string(),
        message,
    }
}
