// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! City, rig, and session naming.

/// Build a rig-scoped key from an automation or agent name.
///
/// City-level entries (empty rig) use the bare name so city-scoped and
/// rig-scoped entries of the same bare name never collide in persistence.
pub fn scoped_name(name: &str, rig: &str) -> String {
    if rig.is_empty() {
        name.to_string()
    } else {
        format!("{}:rig:{}", name, rig)
    }
}

/// Split a scoped key back into `(name, rig)`.
///
/// Returns an empty rig when no `:rig:` marker is present.
pub fn split_scoped_name(scoped: &str) -> (&str, &str) {
    match scoped.split_once(":rig:") {
        Some((name, rig)) => (name, rig),
        None => (scoped, ""),
    }
}

/// Derive the backend session name for an agent.
///
/// An empty template yields `gc-{city}-{agent}` with `/` in the agent name
/// flattened to `--` so rig paths stay one tmux-safe token. A non-empty
/// template substitutes `{city}` and `{agent}` placeholders.
pub fn session_name(city: &str, agent: &str, template: &str) -> String {
    let sanitized = agent.replace('/', "--");
    if template.is_empty() {
        format!("gc-{}-{}", city, sanitized)
    } else {
        template
            .replace("{city}", city)
            .replace("{agent}", &sanitized)
    }
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
