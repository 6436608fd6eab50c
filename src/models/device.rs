// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, net::Ipv4Addr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown device status {0:?}")]
pub struct ParseDeviceStatusError(String);

/// Reachability status of a known device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
    Error,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
            DeviceStatus::Error => "error",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = ParseDeviceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "unknown" => Ok(DeviceStatus::Unknown),
            "error" => Ok(DeviceStatus::Error),
            other => Err(ParseDeviceStatusError(other.to_string())),
        }
    }
}

/// Coarse device family, derived from the `uname -s` fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Linux,
    Macos,
    Windows,
    Unknown,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Linux => "linux",
            DeviceType::Macos => "macos",
            DeviceType::Windows => "windows",
            DeviceType::Unknown => "unknown",
        }
    }

    /// Case-insensitive classification of an OS name fact.
    pub fn from_os_fact(os: &str) -> Self {
        let os = os.to_ascii_lowercase();
        if os.contains("linux") {
            DeviceType::Linux
        } else if os.contains("darwin") {
            DeviceType::Macos
        } else if os.contains("windows") {
            DeviceType::Windows
        } else {
            DeviceType::Unknown
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ParseDeviceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(DeviceType::Linux),
            "macos" => Ok(DeviceType::Macos),
            "windows" => Ok(DeviceType::Windows),
            "unknown" => Ok(DeviceType::Unknown),
            other => Err(ParseDeviceStatusError(other.to_string())),
        }
    }
}

/// A host known to the system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    /// `"unknown"` when the probe could not read one.
    pub hostname: String,
    pub ip_address: Ipv4Addr,
    pub device_type: DeviceType,
    /// Full probe output as JSON.
    pub os_info: Option<serde_json::Value>,
    /// Profile that discovered the device; the transitive ownership root.
    pub credential_profile_id: Uuid,
    /// Job whose scan last touched the device.
    pub discovered_by_job: Option<Uuid>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a freshly probed host.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub hostname: String,
    pub ip_address: Ipv4Addr,
    pub device_type: DeviceType,
    pub os_info: serde_json::Value,
    pub credential_profile_id: Uuid,
    pub discovered_by_job: Option<Uuid>,
    pub status: DeviceStatus,
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub hostname: Option<String>,
    pub device_type: Option<DeviceType>,
    pub os_info: Option<serde_json::Value>,
    pub status: Option<DeviceStatus>,
}
