// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment table tests

use super::*;

fn env(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|e| e.to_string()).collect()
}

#[test]
fn lookup_finds_value() {
    let table = env(&["JOB=cron", "INSTANCE=tty1"]);
    assert_eq!(lookup(&table, "JOB"), Some("cron"));
    assert_eq!(lookup(&table, "INSTANCE"), Some("tty1"));
    assert_eq!(lookup(&table, "MISSING"), None);
}

#[test]
fn entry_without_equals_is_bare_key() {
    let table = env(&["FLAG"]);
    assert_eq!(lookup(&table, "FLAG"), Some(""));
}

#[test]
fn set_replaces_existing_key_in_place() {
    let mut table = env(&["A=1", "B=2"]);
    set(&mut table, "A", "3");
    assert_eq!(table, env(&["A=3", "B=2"]));
}

#[test]
fn add_appends_new_key() {
    let mut table = env(&["A=1"]);
    add(&mut table, "B=2");
    assert_eq!(table, env(&["A=1", "B=2"]));
}

#[test]
fn merge_keeps_order_and_replaces_duplicates() {
    let mut table = env(&["A=1", "B=2"]);
    merge(&mut table, &env(&["B=9", "C=3"]));
    assert_eq!(table, env(&["A=1", "B=9", "C=3"]));
}

#[test]
fn expand_simple_reference() {
    let table = env(&["TTY=tty1"]);
    assert_eq!(expand("$TTY", &table).unwrap(), "tty1");
    assert_eq!(expand("console-${TTY}", &table).unwrap(), "console-tty1");
}

#[test]
fn expand_literal_dollar() {
    assert_eq!(expand("a$$b", &[]).unwrap(), "a$b");
}

#[test]
fn expand_unknown_variable_is_an_error() {
    assert_eq!(
        expand("$NOPE", &[]),
        Err(ExpandError::UnknownVariable("NOPE".to_string()))
    );
}

#[test]
fn expand_unterminated_brace_is_an_error() {
    assert_eq!(expand("${TTY", &env(&["TTY=x"])), Err(ExpandError::Unterminated));
}

#[test]
fn expand_empty_template_is_empty() {
    assert_eq!(expand("", &[]).unwrap(), "");
}
