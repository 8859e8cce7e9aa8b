// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    seconds      = { "30s",  30 },
    minutes      = { "5m",   300 },
    hours        = { "24h",  86400 },
    days         = { "2d",   172800 },
    bare_number  = { "45",   45 },
    long_suffix  = { "10 minutes", 600 },
)]
fn parses_seconds(input: &str, expected_secs: u64) {
    assert_eq!(parse_duration(input).unwrap(), Duration::from_secs(expected_secs));
}

#[test]
fn parses_milliseconds() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
}

#[yare::parameterized(
    empty          = { "" },
    bad_suffix     = { "5parsecs" },
    no_number      = { "h" },
)]
fn rejects(input: &str) {
    assert!(parse_duration(input).is_err());
}

#[yare::parameterized(
    zero_seconds     = { 0,      "0s" },
    max_seconds      = { 59,     "59s" },
    one_minute       = { 60,     "1m" },
    one_hour         = { 3600,   "1h" },
    hour_and_minutes = { 45000,  "12h30m" },
    one_day          = { 86400,  "1d" },
)]
fn elapsed(secs: u64, expected: &str) {
    assert_eq!(format_elapsed(secs), expected);
}
