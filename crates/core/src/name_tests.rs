// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    city_level    = { "digest", "", "digest" },
    rig_scoped    = { "convoy-check", "alpha", "convoy-check:rig:alpha" },
    rig_with_dash = { "digest", "bright-lights", "digest:rig:bright-lights" },
)]
fn scoped(name: &str, rig: &str, expected: &str) {
    assert_eq!(scoped_name(name, rig), expected);
}

#[test]
fn scoped_names_with_same_bare_name_do_not_collide() {
    assert_ne!(scoped_name("digest", ""), scoped_name("digest", "alpha"));
    assert_ne!(scoped_name("digest", "alpha"), scoped_name("digest", "beta"));
}

#[yare::parameterized(
    bare        = { "digest",            ("digest", "") },
    scoped      = { "digest:rig:alpha",  ("digest", "alpha") },
)]
fn split(scoped: &str, expected: (&str, &str)) {
    assert_eq!(split_scoped_name(scoped), expected);
}

#[test]
fn default_template_flattens_slashes() {
    assert_eq!(
        session_name("bright-lights", "hello-world/polecat", ""),
        "gc-bright-lights-hello-world--polecat"
    );
}

#[test]
fn default_template_plain_agent() {
    assert_eq!(session_name("bright-lights", "mayor", ""), "gc-bright-lights-mayor");
}

#[test]
fn custom_template_substitutes_placeholders() {
    assert_eq!(
        session_name("bright-lights", "rig/polecat", "agents-{city}.{agent}"),
        "agents-bright-lights.rig--polecat"
    );
}
