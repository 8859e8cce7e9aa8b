// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic session identity fingerprint.
//!
//! External reconciliation compares a running session's recorded fingerprint
//! against the one derived from the current config to decide whether the
//! session still matches its definition. Only identity-defining inputs
//! participate: the command line, the environment, and any caller-supplied
//! extra pairs. Observation hints never change identity.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// 64-character lowercase hex SHA-256 over the canonical encoding of
/// `command`, sorted `env`, and sorted `extra`.
///
/// Canonical form: `command 0x00 (k "=" v 0x00)* ["fp" 0x00 (k "=" v 0x00)*]`
/// where the `fp` section appears only when `extra` is non-empty. Sorting
/// makes the result independent of map iteration order.
pub fn fingerprint(
    command: &str,
    env: &HashMap<String, String>,
    extra: &HashMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hasher.update([0u8]);

    let sorted: BTreeMap<&str, &str> = env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    for (k, v) in sorted {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update([0u8]);
    }

    if !extra.is_empty() {
        hasher.update(b"fp");
        hasher.update([0u8]);
        let sorted: BTreeMap<&str, &str> =
            extra.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        for (k, v) in sorted {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update([0u8]);
        }
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
