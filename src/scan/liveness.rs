// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io::ErrorKind, net::Ipv4Addr, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, info};

/// Best-effort reachability sweep.
///
/// Runs without elevated privileges, so instead of a raw ICMP echo each
/// probe is a short TCP connect: a completed handshake proves the host is
/// up, and so does an RST (refused/reset). Only silence within the timeout
/// counts as dead. Per-host failures are never fatal; the sweep returns the
/// survivor subset.
#[derive(Debug, Clone)]
pub struct LivenessProber {
    timeout: Duration,
    max_concurrent: usize,
}

impl LivenessProber {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            max_concurrent,
        }
    }

    /// Probes every candidate concurrently (bounded) and returns the alive
    /// subset in ascending address order.
    pub async fn sweep(&self, candidates: &[Ipv4Addr], port: u16) -> Vec<Ipv4Addr> {
        let limit = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for &addr in candidates {
            let limit = limit.clone();
            let per_host = self.timeout;
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await;
                (addr, probe_one(addr, port, per_host).await)
            });
        }

        let mut alive = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((addr, up)) = joined {
                debug!(host = %addr, alive = up, "liveness probe");
                if up {
                    alive.push(addr);
                }
            }
        }

        alive.sort_unstable();
        info!(
            candidates = candidates.len(),
            alive = alive.len(),
            "liveness stage finished"
        );
        alive
    }
}

async fn probe_one(addr: Ipv4Addr, port: u16, per_host: Duration) -> bool {
    match timeout(per_host, TcpStream::connect((addr, port))).await {
        Ok(Ok(_stream)) => true,
        // A refused or reset connect still came from a live IP stack.
        Ok(Err(e)) => matches!(
            e.kind(),
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ),
        Err(_) => false,
    }
}
