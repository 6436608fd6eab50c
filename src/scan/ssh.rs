// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, info, warn};

use crate::models::device::DeviceType;

/// Output value used when a remote command prints nothing.
pub const UNKNOWN_FACT: &str = "unknown";

/// Decrypted credential material handed to the prober. Lives only inside
/// discovery workers; never serialized.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub username: String,
    pub password: String,
    /// PEM private key; preferred over the password when present.
    pub private_key: Option<String>,
    pub port: u16,
}

/// Facts collected from one authenticated host.
///
/// Field values are trimmed stdout of the fixed command set; an empty
/// output is recorded as the literal `"unknown"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostFacts {
    pub hostname: String,
    pub os: String,
    pub os_version: String,
    pub architecture: String,
    pub uptime: String,
    pub cpu_info: String,
    pub memory_info: String,
    pub disk_info: String,
}

impl HostFacts {
    /// Classifies the host from its `uname -s` output.
    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_os_fact(&self.os)
    }
}

/// Authenticated SSH probe over the port-stage survivors.
///
/// Host-key verification is disabled: the prober talks to hosts it has
/// never seen before, and the scan context has no key inventory to pin
/// against. The timeout bounds the connect and each remote command.
#[derive(Debug, Clone)]
pub struct SshProber {
    timeout: Duration,
    max_concurrent: usize,
}

impl SshProber {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            max_concurrent,
        }
    }

    /// Probes every candidate concurrently (bounded). Hosts that fail the
    /// session or a command are skipped and logged; the sweep itself never
    /// fails.
    pub async fn sweep(
        &self,
        candidates: &[Ipv4Addr],
        creds: &SshCredentials,
    ) -> Vec<(Ipv4Addr, HostFacts)> {
        let limit = Arc::new(Semaphore::new(self.max_concurrent));
        let creds = Arc::new(creds.clone());
        let mut tasks = JoinSet::new();

        for &addr in candidates {
            let limit = limit.clone();
            let creds = creds.clone();
            let per_op = self.timeout;
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await;
                (addr, probe_host(addr, &creds, per_op).await)
            });
        }

        let mut probed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((addr, Ok(facts))) => {
                    debug!(host = %addr, hostname = %facts.hostname, "ssh probe succeeded");
                    probed.push((addr, facts));
                },
                Ok((addr, Err(e))) => {
                    // Unreachable/unauthenticated hosts are expected noise.
                    warn!(host = %addr, error = %format!("{e:#}"), "ssh probe skipped host");
                },
                Err(e) => warn!(error = %e, "ssh probe task aborted"),
            }
        }

        probed.sort_unstable_by_key(|(addr, _)| *addr);
        info!(
            candidates = candidates.len(),
            probed = probed.len(),
            "ssh stage finished"
        );
        probed
    }
}

async fn probe_host(
    addr: Ipv4Addr,
    creds: &SshCredentials,
    per_op: Duration,
) -> Result<HostFacts> {
    let auth = match &creds.private_key {
        Some(key) => AuthMethod::with_key(key, None),
        None => AuthMethod::with_password(&creds.password),
    };

    let client = timeout(
        per_op,
        Client::connect(
            (addr.to_string(), creds.port),
            &creds.username,
            auth,
            ServerCheckMethod::NoCheck,
        ),
    )
    .await
    .context("ssh connect timed out")?
    .context("ssh connect failed")?;

    let facts = collect_facts(&client, per_op).await;

    // Best-effort; the session dies with the connection either way.
    let _ = client.disconnect().await;

    facts
}

async fn collect_facts(client: &Client, per_op: Duration) -> Result<HostFacts> {
    let hostname = run(client, "hostname", per_op).await?;
    let os = run(client, "uname -s", per_op).await?;
    let os_version = run(client, "uname -r", per_op).await?;
    let architecture = run(client, "uname -m", per_op).await?;
    let uptime = run(client, "uptime", per_op).await?;
    let cpuinfo = run(client, "cat /proc/cpuinfo", per_op).await?;
    let memory_info = run(client, "free -h", per_op).await?;
    let disk_info = run(client, "df -h", per_op).await?;

    Ok(HostFacts {
        hostname: normalize(&hostname),
        os: normalize(&os),
        os_version: normalize(&os_version),
        architecture: normalize(&architecture),
        uptime: normalize(&uptime),
        cpu_info: normalize(model_name_line(&cpuinfo)),
        memory_info: normalize(&memory_info),
        disk_info: normalize(&disk_info),
    })
}

/// Executes one remote command and returns its raw stdout.
///
/// Transport errors fail the host; a non-zero exit merely yields whatever
/// the command printed (usually nothing, which becomes `"unknown"`).
async fn run(client: &Client, cmd: &str, per_op: Duration) -> Result<String> {
    let out = timeout(per_op, client.execute(cmd))
        .await
        .with_context(|| format!("command {cmd:?} timed out"))?
        .with_context(|| format!("command {cmd:?} failed"))?;

    if out.exit_status != 0 {
        debug!(cmd, exit = out.exit_status, "remote command returned non-zero");
    }
    Ok(out.stdout)
}

/// First `/proc/cpuinfo` line matching `model name`.
pub(crate) fn model_name_line(cpuinfo: &str) -> &str {
    cpuinfo
        .lines()
        .find(|l| l.contains("model name"))
        .unwrap_or("")
}

/// Trims output, mapping empty results to [`UNKNOWN_FACT`].
pub(crate) fn normalize(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        UNKNOWN_FACT.to_string()
    } else {
        t.to_string()
    }
}
