// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::engine::StartDiscovery;

/// `discovery.start` payload: the caller's request plus its owner id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(flatten)]
    pub request: StartDiscovery,
    pub owner_id: Uuid,
}

/// Payload of the status/results/cancel channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: Uuid,
    pub owner_id: Uuid,
}

/// Milliseconds since the Unix epoch, the `timestamp` of every reply.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wraps a domain payload into the success reply shape: the given fields
/// plus `success: true` and `timestamp`.
pub fn success_reply(body: Value) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        },
    };
    map.insert("success".to_string(), Value::Bool(true));
    map.insert("timestamp".to_string(), Value::from(epoch_millis()));
    Value::Object(map)
}
