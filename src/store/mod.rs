//! Postgres persistence.
//!
//! Each scheduling domain builds its own pool through [`connect_pool`];
//! pools are never shared across domains, so blocking scan workers cannot
//! starve the request domain of connections. Store methods return
//! `Ok(None)` / `Ok(false)` when no owned row matched, leaving the caller
//! to surface `NotFound` without distinguishing absent from foreign rows.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::cfg::config::DatabaseConfig;

/// Device rows.
pub mod devices;
/// Discovery job rows.
pub mod jobs;
/// Credential profile rows.
pub mod profiles;

/// Builds a lazily-connecting pool for one scheduling domain.
pub fn connect_pool(cfg: &DatabaseConfig) -> PgPool {
    let opts = PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .database(&cfg.name)
        .username(&cfg.user)
        .password(&cfg.password)
        .ssl_mode(if cfg.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });

    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_lazy_with(opts)
}

/// Applies the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("failed to run database migrations")
}

/// Store handles sharing one pool; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Stores {
    pub profiles: profiles::ProfileStore,
    pub jobs: jobs::JobStore,
    pub devices: devices::DeviceStore,
}

impl Stores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            profiles: profiles::ProfileStore::new(pool.clone()),
            jobs: jobs::JobStore::new(pool.clone()),
            devices: devices::DeviceStore::new(pool),
        }
    }
}
