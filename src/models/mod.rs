//! Domain model: credential profiles, discovery jobs, and devices.
//!
//! Statuses and device types are closed enumerations inside the core;
//! they convert to and from strings only at the persistence and wire
//! edges.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Discovered hosts.
pub mod device;
/// Discovery job records and the job state machine.
pub mod job;
/// Owner-scoped SSH credential bundles.
pub mod profile;
