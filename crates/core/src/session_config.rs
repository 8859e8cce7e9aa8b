// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative session configuration consumed by `SessionProvider::start`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One file to stage into the session filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFile {
    /// Absolute or city-relative source path on the host.
    pub src: String,
    /// Destination path relative to the session working directory.
    pub rel_dst: String,
}

/// Everything a provider needs to create and verify one agent session.
///
/// The caller constructs the value and hands it to the provider; nothing is
/// shared or mutated afterwards. Observation hints (`ready_prompt_prefix`,
/// `ready_delay_ms`, `process_names`, `emits_permission_warning`, `nudge`)
/// influence startup verification only — they are excluded from the identity
/// fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shell command line for the agent.
    pub command: String,

    /// Initial working directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_dir: String,

    /// Extra environment for the session.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Text the last non-empty pane line ends with once the agent is
    /// interactive.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ready_prompt_prefix: String,

    /// Fallback fixed readiness wait, in milliseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ready_delay_ms: u64,

    /// Candidate process names for liveness, in preference order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_names: Vec<String>,

    /// Agent shows a dismissible permission dialog on startup.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub emits_permission_warning: bool,

    /// Text typed into the session once it is ready.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nudge: String,

    /// Host shell commands run before session creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_start: Vec<String>,

    /// Shell commands run inside the host after the session is verified
    /// alive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_setup: Vec<String>,

    /// Script run after `session_setup` commands.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_setup_script: String,

    /// Directory overlaid into the session filesystem.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub overlay_dir: String,

    /// Individual files staged into the session filesystem.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copy_files: Vec<CopyFile>,

    /// Identity data beyond command + env.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fingerprint_extra: HashMap<String, String>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl SessionConfig {
    /// True when nothing is requested beyond session creation: no
    /// readiness hints, no permission dialog, no nudge, no setup, no
    /// pre-start hooks. Liveness candidates (`process_names`) are not
    /// part of this: the startup sequence weighs them separately.
    pub fn fire_and_forget(&self) -> bool {
        self.ready_prompt_prefix.is_empty()
            && self.ready_delay_ms == 0
            && !self.emits_permission_warning
            && self.nudge.is_empty()
            && self.pre_start.is_empty()
            && self.session_setup.is_empty()
            && self.session_setup_script.is_empty()
    }

    /// True when the session filesystem needs staged files.
    pub fn needs_staging(&self) -> bool {
        !self.overlay_dir.is_empty() || !self.copy_files.is_empty()
    }

    /// Identity fingerprint over `command`, `env`, and `fingerprint_extra`.
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::fingerprint(&self.command, &self.env, &self.fingerprint_extra)
    }
}

#[cfg(test)]
#[path = "session_config_tests.rs"]
mod tests;
