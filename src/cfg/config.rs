// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Lowest number of simultaneous probes a stage may be capped at.
const MIN_PROBE_CAP: usize = 64;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Discovery engine knobs: worker sizing and scan stage tuning.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Control-plane transport sizing between the request domain and the
    /// discovery workers.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Secret-store key material.
    pub encryption: EncryptionConfig,
    /// Postgres connection settings.
    pub database: DatabaseConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct DiscoveryConfig {
    #[serde(default)]
    /// Worker-pool sizing for the discovery domain.
    pub worker: WorkerConfig,
    #[serde(default)]
    /// Per-stage scan tuning.
    pub scan: ScanConfig,
}

/// Sizing of the discovery worker pool. The pool runs
/// `instances * poolSize` threads, all isolated from the request domain.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_instances")]
    /// Number of worker group instances.
    pub instances: u32,
    #[serde(default = "default_pool_size", rename = "poolSize")]
    /// Threads per instance.
    pub pool_size: u32,
}

impl WorkerConfig {
    /// Total worker count across all instances.
    pub fn total_workers(&self) -> usize {
        (self.instances * self.pool_size) as usize
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            pool_size: default_pool_size(),
        }
    }
}

/// Stage timeouts and probe caps for one discovery job.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ScanConfig {
    #[serde(
        default = "default_liveness_timeout",
        rename = "livenessTimeout",
        with = "serde_secs"
    )]
    /// Per-host timeout of the liveness stage.
    pub liveness_timeout: Duration,
    #[serde(
        default = "default_port_timeout",
        rename = "portTimeout",
        with = "serde_secs"
    )]
    /// Per-host timeout of the TCP port stage.
    pub port_timeout: Duration,
    #[serde(
        default = "default_ssh_timeout",
        rename = "sshTimeout",
        with = "serde_secs"
    )]
    /// SSH connect timeout, also applied to each remote command.
    pub ssh_timeout: Duration,
    #[serde(default = "default_probe_cap", rename = "maxConcurrentProbes")]
    /// Cap on simultaneous probes per stage per job.
    pub max_concurrent_probes: usize,
    #[serde(default = "default_min_prefix", rename = "minPrefix")]
    /// Shortest CIDR prefix accepted without `allowLargeRanges`.
    pub min_prefix: u8,
    #[serde(default, rename = "allowLargeRanges")]
    /// Permits prefixes shorter than `minPrefix`.
    pub allow_large_ranges: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: default_liveness_timeout(),
            port_timeout: default_port_timeout(),
            ssh_timeout: default_ssh_timeout(),
            max_concurrent_probes: default_probe_cap(),
            min_prefix: default_min_prefix(),
            allow_large_ranges: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_capacity")]
    /// Mailbox depth before senders are backpressured.
    pub capacity: usize,
    #[serde(
        default = "default_reply_timeout",
        rename = "replyTimeout",
        with = "serde_secs"
    )]
    /// How long a caller waits for a worker reply.
    pub reply_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            reply_timeout: default_reply_timeout(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EncryptionConfig {
    /// 256-bit AEAD key, base64 (standard or URL-safe alphabet).
    pub key: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name.
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    /// Require TLS on the database connection.
    pub ssl: bool,
    #[serde(default = "default_max_connections", rename = "maxConnections")]
    /// Pool size. Each scheduling domain gets its own pool of this size.
    pub max_connections: u32,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(&path).with_context(|| {
            format!("failed to read config file {:?}", path.as_ref())
        })?;
        Self::load_from_str(&s)
    }

    /// Parses and validates a YAML configuration document.
    pub fn load_from_str(s: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_yaml::from_str(s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.discovery.worker.instances >= 1,
            "discovery.worker.instances must be >= 1"
        );
        ensure!(
            self.discovery.worker.pool_size >= 1,
            "discovery.worker.poolSize must be >= 1"
        );
        ensure!(
            self.discovery.scan.min_prefix <= 32,
            "discovery.scan.minPrefix must be within [0, 32]"
        );

        // The probe cap is a lower-bounded knob, not a hard failure.
        if self.discovery.scan.max_concurrent_probes < MIN_PROBE_CAP {
            self.discovery.scan.max_concurrent_probes = MIN_PROBE_CAP;
        }

        ensure!(self.transport.capacity >= 1, "transport.capacity must be >= 1");
        ensure!(
            !self.encryption.key.trim().is_empty(),
            "encryption.key is required"
        );
        ensure!(!self.database.host.is_empty(), "database.host is required");
        ensure!(!self.database.name.is_empty(), "database.name is required");
        ensure!(!self.database.user.is_empty(), "database.user is required");
        ensure!(
            self.database.max_connections >= 1,
            "database.maxConnections must be >= 1"
        );

        Ok(())
    }
}

fn default_instances() -> u32 {
    2
}
fn default_pool_size() -> u32 {
    4
}
fn default_liveness_timeout() -> Duration {
    Duration::from_secs(1)
}
fn default_port_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_ssh_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_probe_cap() -> usize {
    128
}
fn default_min_prefix() -> u8 {
    16
}
fn default_capacity() -> usize {
    64
}
fn default_reply_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_db_port() -> u16 {
    5432
}
fn default_max_connections() -> u32 {
    8
}

/// Serde helpers for representing `Duration` as a number of seconds.
pub(crate) mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
