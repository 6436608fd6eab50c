//! Control-plane transport between the request domain and the discovery
//! workers.
//!
//! Four logical channels (`discovery.start|status|results|cancel`) share
//! one mailbox. Every request carries a JSON payload including the caller's
//! owner id and receives exactly one reply through a oneshot completion
//! handle; the mailbox hands each message to the first idle worker. The
//! reference deployment is local-only, but nothing here assumes the caller
//! and the workers share more than the channel endpoints.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::timeout,
};

/// Wire payload shapes and reply builders.
pub mod messages;
/// Transport-backed implementation of the discovery capability set.
pub mod proxy;

/// Logical request channels of the discovery control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Start,
    Status,
    Results,
    Cancel,
}

impl ChannelId {
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Start => "discovery.start",
            ChannelId::Status => "discovery.status",
            ChannelId::Results => "discovery.results",
            ChannelId::Cancel => "discovery.cancel",
        }
    }
}

/// Failure half of a reply: a machine-readable code plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error}: {message}")]
pub struct Fault {
    /// Error code, e.g. `not_found` or `transport_failure`.
    pub error: String,
    pub message: String,
}

impl Fault {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: "transport_failure".to_string(),
            message: message.into(),
        }
    }

    /// The §external-contract failure body consumed by the front end.
    pub fn to_body(&self) -> Value {
        serde_json::json!({
            "success": false,
            "timestamp": messages::epoch_millis(),
            "error": self.error,
            "message": self.message,
        })
    }
}

/// A single reply: success payload or fault.
pub type Reply = Result<Value, Fault>;

#[derive(Debug)]
pub struct Request {
    pub channel: ChannelId,
    pub payload: Value,
}

/// One in-flight request with its completion handle.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply_tx: oneshot::Sender<Reply>,
}

/// Shared receiving end of the mailbox; each idle worker takes the lock to
/// pull the next request.
pub type Mailbox = Arc<Mutex<mpsc::Receiver<Envelope>>>;

/// Caller-side handle of the control plane. Cheap to clone; every clone
/// feeds the same worker mailbox.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: mpsc::Sender<Envelope>,
    reply_timeout: Duration,
}

impl Bus {
    pub fn new(capacity: usize, reply_timeout: Duration) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self { tx, reply_timeout },
            Arc::new(Mutex::new(rx)),
        )
    }

    /// Sends one request and awaits its single reply.
    ///
    /// The request domain only ever suspends here; scan work never runs on
    /// the caller's scheduler.
    pub async fn request(&self, channel: ChannelId, payload: Value) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request: Request { channel, payload },
                reply_tx,
            })
            .await
            .map_err(|_| Fault::transport("no discovery worker is accepting requests"))?;

        match timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(Fault::transport("discovery worker dropped the reply")),
            Err(_) => Err(Fault::transport(format!(
                "timed out waiting for a reply on {}",
                channel.name()
            ))),
        }
    }
}
