// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(content: &str) -> Result<Automation, ScanError> {
    parse_automation(content, "digest", Path::new("/layers/base/automations/digest/automation.toml"))
}

#[test]
fn parses_cooldown_automation() {
    let automation = parse(
        r#"
        [automation]
        formula = "daily-digest"
        gate = "cooldown"
        interval = "24h"
        "#,
    )
    .unwrap();

    assert_eq!(automation.name, "digest");
    assert_eq!(automation.gate, GateKind::Cooldown);
    assert_eq!(automation.interval, "24h");
    assert!(automation.enabled);
    assert_eq!(
        automation.source,
        Path::new("/layers/base/automations/digest/automation.toml")
    );
}

#[test]
fn directory_name_is_authoritative() {
    // The file cannot rename the automation: name is not even a field
    let automation = parse(
        r#"
        [automation]
        exec = "true"
        gate = "manual"
        "#,
    )
    .unwrap();
    assert_eq!(automation.name, "digest");
}

#[test]
fn scoped_name_includes_rig() {
    let automation = parse(
        r#"
        [automation]
        rig = "alpha"
        exec = "true"
        gate = "manual"
        "#,
    )
    .unwrap();
    assert_eq!(automation.scoped_name(), "digest:rig:alpha");
}

#[yare::parameterized(
    both_set     = { r#"formula = "f"
exec = "x"
gate = "manual""# },
    neither_set  = { r#"gate = "manual""# },
    cooldown_no_interval = { r#"exec = "x"
gate = "cooldown""# },
    cooldown_bad_interval = { r#"exec = "x"
gate = "cooldown"
interval = "yearly""# },
    cron_no_schedule = { r#"exec = "x"
gate = "cron""# },
    condition_no_check = { r#"exec = "x"
gate = "condition""# },
    event_no_on = { r#"exec = "x"
gate = "event""# },
    bad_timeout = { r#"exec = "x"
gate = "manual"
timeout = "soon""# },
)]
fn rejects_invalid_definitions(body: &str) {
    let content = format!("[automation]\n{}\n", body);
    assert!(matches!(
        parse(&content),
        Err(ScanError::Invalid { .. })
    ));
}

#[test]
fn rejects_malformed_toml() {
    assert!(matches!(parse("[automation"), Err(ScanError::Toml { .. })));
}

#[test]
fn disabled_flag_round_trips() {
    let automation = parse(
        r#"
        [automation]
        exec = "true"
        gate = "manual"
        enabled = false
        "#,
    )
    .unwrap();
    assert!(!automation.enabled);
}

#[test]
fn event_gate_with_pool_and_timeout() {
    let automation = parse(
        r#"
        [automation]
        formula = "convoy-sweep"
        gate = "event"
        on = "bead.closed"
        pool = "heavy"
        timeout = "30m"
        "#,
    )
    .unwrap();
    assert_eq!(automation.on, "bead.closed");
    assert_eq!(automation.pool.as_deref(), Some("heavy"));
    assert_eq!(automation.timeout.as_deref(), Some("30m"));
}
