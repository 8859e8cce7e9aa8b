// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

/// Reference POSIX parse of a single-quoted word sequence.
///
/// Walks the quoted string the way `sh` would: inside single quotes every
/// byte is literal; `\'` outside quotes is a literal quote character.
fn posix_unquote(quoted: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => out.push(c),
                    None => return None,
                }
            },
            '\\' => out.push(chars.next()?),
            _ => return None,
        }
    }
    Some(out)
}

#[test]
fn plain_string_is_wrapped() {
    assert_eq!(shell_quote("hello"), "'hello'");
}

#[test]
fn embedded_quote_uses_four_char_escape() {
    assert_eq!(shell_quote("it's here"), "'it'\\''s here'");
}

#[test]
fn empty_string_quotes_to_empty_word() {
    assert_eq!(shell_quote(""), "''");
    assert_eq!(posix_unquote("''").unwrap(), "");
}

#[yare::parameterized(
    dollar    = { "$HOME is not expanded" },
    backtick  = { "`date`" },
    newline   = { "line one\nline two" },
    quotes    = { "'''" },
    mixed     = { "don't `eval` $this" },
)]
fn round_trips(input: &str) {
    assert_eq!(posix_unquote(&shell_quote(input)).unwrap(), input);
}

proptest! {
    #[test]
    fn round_trips_arbitrary_strings(s in ".*") {
        prop_assert_eq!(posix_unquote(&shell_quote(&s)), Some(s));
    }
}
