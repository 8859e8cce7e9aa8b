// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation definition parsed from `automation.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from scanning and validating automation definitions
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid automation {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("override has empty name")]
    EmptyOverrideName,

    #[error("override {name} matches no scanned automation")]
    UnknownOverride { name: String },
}

/// Which predicate decides that an automation is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Due when `interval` has elapsed since the last run.
    Cooldown,
    /// Due when the 5-field `schedule` matches the current minute.
    Cron,
    /// Due when the `check` command exits 0.
    Condition,
    /// Due when events of type `on` arrived past the cursor.
    Event,
    /// Never due automatically.
    Manual,
}

/// One automation as defined on disk, after layer resolution.
///
/// Never mutated after scan; overrides produce the final value before the
/// scan output is assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    /// Authoritative name, taken from the definition directory.
    #[serde(skip)]
    pub name: String,

    /// Owning rig; empty for city-level automations.
    #[serde(default)]
    pub rig: String,

    /// Formula to dispatch. Exactly one of `formula`/`exec` is set.
    #[serde(default)]
    pub formula: Option<String>,

    /// Shell command to dispatch instead of a formula.
    #[serde(default)]
    pub exec: Option<String>,

    pub gate: GateKind,

    /// Cooldown interval duration string (e.g. "24h").
    #[serde(default)]
    pub interval: String,

    /// Cron 5-field schedule.
    #[serde(default)]
    pub schedule: String,

    /// Condition gate shell command.
    #[serde(default)]
    pub check: String,

    /// Event gate trigger type.
    #[serde(default)]
    pub on: String,

    /// Dispatch pool hint for the controller.
    #[serde(default)]
    pub pool: Option<String>,

    /// Run timeout duration string.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Path of the definition file this automation came from.
    #[serde(skip)]
    pub source: PathBuf,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    /// Persistence key: rig-scoped so same-named automations in different
    /// scopes never collide.
    pub fn scoped_name(&self) -> String {
        gc_core::scoped_name(&self.name, &self.rig)
    }

    /// Check structural invariants after parse or override application.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| ScanError::Invalid {
            name: self.name.clone(),
            message: message.to_string(),
        };

        match (&self.formula, &self.exec) {
            (Some(_), Some(_)) => return Err(invalid("formula and exec are both set")),
            (None, None) => return Err(invalid("one of formula or exec is required")),
            _ => {}
        }

        match self.gate {
            GateKind::Cooldown if self.interval.is_empty() => {
                return Err(invalid("cooldown gate requires interval"));
            }
            GateKind::Cooldown => {
                gc_core::parse_duration(&self.interval)
                    .map_err(|e| invalid(&format!("bad interval: {}", e)))?;
            }
            GateKind::Cron if self.schedule.is_empty() => {
                return Err(invalid("cron gate requires schedule"));
            }
            GateKind::Condition if self.check.is_empty() => {
                return Err(invalid("condition gate requires check"));
            }
            GateKind::Event if self.on.is_empty() => {
                return Err(invalid("event gate requires on"));
            }
            _ => {}
        }

        if let Some(timeout) = &self.timeout {
            gc_core::parse_duration(timeout)
                .map_err(|e| invalid(&format!("bad timeout: {}", e)))?;
        }

        Ok(())
    }
}

/// On-disk shape: a single `[automation]` table.
#[derive(Deserialize)]
struct AutomationFile {
    automation: Automation,
}

/// Parse one definition file. The directory name wins over anything the
/// file might claim; `source` records where the definition came from.
pub fn parse_automation(content: &str, name: &str, source: &Path) -> Result<Automation, ScanError> {
    let file: AutomationFile = toml::from_str(content).map_err(|source_err| ScanError::Toml {
        path: source.to_owned(),
        source: source_err,
    })?;

    let mut automation = file.automation;
    automation.name = name.to_string();
    automation.source = source.to_owned();
    automation.validate()?;
    Ok(automation)
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
