// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered automation discovery.
//!
//! Formula layers are searched low to high priority; a higher layer that
//! redefines a name replaces the binding without losing its discovery
//! position. Layout: `<layer>/automations/<name>/automation.toml`.

use crate::automation::{parse_automation, Automation, ScanError};
use crate::overrides::{apply_overrides, AutomationOverride};
use indexmap::IndexMap;
use std::path::Path;
use tracing::debug;

/// Scan all layers, returning every definition (disabled ones included) in
/// discovery order.
pub fn discover(layers: &[impl AsRef<Path>]) -> Result<Vec<Automation>, ScanError> {
    let mut found: IndexMap<String, Automation> = IndexMap::new();

    for layer in layers {
        let dir = layer.as_ref().join("automations");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(ScanError::Io {
                    path: dir,
                    source: e,
                });
            }
        };

        // Sort for a stable order within one layer
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        for name in names {
            let file = dir.join(&name).join("automation.toml");
            let content = match std::fs::read_to_string(&file) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ScanError::Io {
                        path: file,
                        source: e,
                    });
                }
            };

            let automation = parse_automation(&content, &name, &file)?;
            debug!(name, layer = %layer.as_ref().display(), "scanned automation");
            // IndexMap keeps the original slot on overwrite
            found.insert(name, automation);
        }
    }

    Ok(found.into_values().collect())
}

/// Drop disabled and skip-listed automations, preserving order.
pub fn filter_active(automations: Vec<Automation>, skip: &[String]) -> Vec<Automation> {
    automations
        .into_iter()
        .filter(|a| a.enabled && !skip.contains(&a.name))
        .collect()
}

/// Full scan pipeline: discover, apply overrides, filter.
pub fn scan(
    layers: &[impl AsRef<Path>],
    skip: &[String],
    overrides: &[AutomationOverride],
) -> Result<Vec<Automation>, ScanError> {
    let mut automations = discover(layers)?;
    apply_overrides(&mut automations, overrides)?;
    Ok(filter_active(automations, skip))
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
