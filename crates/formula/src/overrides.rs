// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling overrides from external configuration.

use crate::automation::{Automation, GateKind, ScanError};
use serde::Deserialize;

/// A scheduling override targeting scanned automations by name and
/// (optionally) rig. An empty rig matches the name in every scope.
///
/// Only scheduling fields can be overridden; identity fields (name, rig,
/// formula, exec) always come from the definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationOverride {
    pub name: String,
    #[serde(default)]
    pub rig: String,
    #[serde(default)]
    pub gate: Option<GateKind>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub on: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl AutomationOverride {
    fn matches(&self, automation: &Automation) -> bool {
        automation.name == self.name && (self.rig.is_empty() || automation.rig == self.rig)
    }

    fn apply(&self, automation: &mut Automation) {
        if let Some(gate) = self.gate {
            automation.gate = gate;
        }
        if let Some(interval) = &self.interval {
            automation.interval = interval.clone();
        }
        if let Some(schedule) = &self.schedule {
            automation.schedule = schedule.clone();
        }
        if let Some(check) = &self.check {
            automation.check = check.clone();
        }
        if let Some(on) = &self.on {
            automation.on = on.clone();
        }
        if let Some(pool) = &self.pool {
            automation.pool = Some(pool.clone());
        }
        if let Some(timeout) = &self.timeout {
            automation.timeout = Some(timeout.clone());
        }
        if let Some(enabled) = self.enabled {
            automation.enabled = enabled;
        }
    }
}

/// Apply each override to every automation it matches.
///
/// Errors on an empty override name or an override that matches nothing —
/// both indicate stale or mistyped configuration, which must not be
/// silently ignored.
pub fn apply_overrides(
    automations: &mut [Automation],
    overrides: &[AutomationOverride],
) -> Result<(), ScanError> {
    for override_def in overrides {
        if override_def.name.is_empty() {
            return Err(ScanError::EmptyOverrideName);
        }

        let mut matched = false;
        for automation in automations.iter_mut() {
            if override_def.matches(automation) {
                override_def.apply(automation);
                automation.validate()?;
                matched = true;
            }
        }

        if !matched {
            return Err(ScanError::UnknownOverride {
                name: override_def.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "overrides_tests.rs"]
mod tests;
