// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job status {0:?}")]
pub struct ParseJobStatusError(String);

/// Lifecycle of a discovery job.
///
/// Transitions are monotonic: `pending -> running -> {completed, failed}`,
/// plus the cancel shortcut `pending -> failed`. Terminal states accept no
/// further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine admits `self -> next`.
    pub fn can_transition(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// One scan request, as persisted and as serialized over the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    /// Target CIDR in `A.B.C.D/prefix` form.
    pub target_range: String,
    pub credential_profile_id: Uuid,
    /// Summary JSON, rewritten (never appended) on completion, failure, or
    /// cancellation.
    pub results: Option<serde_json::Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
