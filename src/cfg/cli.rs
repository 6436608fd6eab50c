// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolves the effective configuration path.
///
/// The `NETWARDEN_CONFIG` environment variable overrides the compiled-in
/// default; a relative path is anchored at the current working directory.
/// The result is canonicalized so later error messages name the file that
/// was actually opened.
pub fn resolve_config_path(default: &str) -> Result<PathBuf> {
    let chosen = std::env::var("NETWARDEN_CONFIG")
        .map_or_else(|_| PathBuf::from(default), PathBuf::from);

    let absolute = if chosen.is_absolute() {
        chosen
    } else {
        std::env::current_dir()
            .context("cannot determine the working directory")?
            .join(chosen)
    };

    absolute
        .canonicalize()
        .with_context(|| format!("config path {} does not resolve", absolute.display()))
}
