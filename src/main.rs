// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use netwarden::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    engine::{Discovery, DiscoveryEngine, worker::WorkerGroup},
    secret::SecretBox,
    store::{self, Stores},
    transport::{Bus, proxy::DiscoveryProxy},
};
use tracing::info;

/// The daemon runs two isolated scheduling domains: this single-threaded
/// request runtime, which never blocks, and the discovery worker runtime
/// behind the control-plane bus. The HTTP front end (out of tree) receives
/// the proxy handle and its own database pool; it never sees the engine.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _log_guard = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/netwarden.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let secrets = SecretBox::from_key_b64(&cfg.encryption.key)
        .context("encryption.key is unusable")?;

    // The discovery domain owns this pool exclusively.
    let discovery_pool = store::connect_pool(&cfg.database);
    let stores = Stores::new(discovery_pool.clone());

    let group = WorkerGroup::new(&cfg.discovery.worker)?;

    // Database I/O stays in the discovery domain, migrations included.
    group
        .handle()
        .spawn(async move { store::run_migrations(&discovery_pool).await })
        .await
        .context("migration task aborted")??;

    let engine = Arc::new(DiscoveryEngine::new(
        stores,
        secrets,
        cfg.discovery.scan.clone(),
        group.handle(),
    ));

    let (bus, mailbox) = Bus::new(cfg.transport.capacity, cfg.transport.reply_timeout);
    group.serve(engine, mailbox);

    // Assembly-time choice of the capability implementation: the request
    // domain only ever talks to the transport-backed proxy.
    let _discovery: Arc<dyn Discovery> = Arc::new(DiscoveryProxy::new(bus));

    info!(
        workers = group.workers(),
        "netwarden is up; discovery control plane ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutdown requested; draining discovery workers");
    group.shutdown();

    Ok(())
}
