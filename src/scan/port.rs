// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, info};

/// TCP connect sweep that pre-filters hosts before the costly SSH stage.
///
/// A host is open only when the connect completes within the timeout;
/// refused, reset, and timed-out connects all count as closed/filtered.
#[derive(Debug, Clone)]
pub struct PortProber {
    timeout: Duration,
    max_concurrent: usize,
}

impl PortProber {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            timeout,
            max_concurrent,
        }
    }

    /// Returns the subset of hosts with `port` open, ascending.
    pub async fn sweep(&self, candidates: &[Ipv4Addr], port: u16) -> Vec<Ipv4Addr> {
        let limit = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for &addr in candidates {
            let limit = limit.clone();
            let per_host = self.timeout;
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await;
                let open =
                    matches!(timeout(per_host, TcpStream::connect((addr, port))).await, Ok(Ok(_)));
                (addr, open)
            });
        }

        let mut open = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((addr, is_open)) = joined {
                debug!(host = %addr, port, open = is_open, "port probe");
                if is_open {
                    open.push(addr);
                }
            }
        }

        open.sort_unstable();
        info!(
            candidates = candidates.len(),
            open = open.len(),
            port,
            "port stage finished"
        );
        open
    }
}
