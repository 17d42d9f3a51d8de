// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered `KEY=VALUE` environment tables with unique keys

use thiserror::Error;

/// Errors from `$NAME` template expansion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("unterminated variable reference")]
    Unterminated,
}

/// Split an entry into its key and value parts.
///
/// Entries without an `=` are treated as a bare key with an empty value.
pub fn split(entry: &str) -> (&str, &str) {
    match entry.split_once('=') {
        Some((k, v)) => (k, v),
        None => (entry, ""),
    }
}

/// Key part of an entry.
pub fn key_of(entry: &str) -> &str {
    split(entry).0
}

/// Look up the value for `key`.
pub fn lookup<'a>(env: &'a [String], key: &str) -> Option<&'a str> {
    env.iter()
        .find(|entry| key_of(entry) == key)
        .map(|entry| split(entry).1)
}

/// Set `key` to `value`, replacing any existing entry for the key.
pub fn set(env: &mut Vec<String>, key: &str, value: &str) {
    add(env, &format!("{}={}", key, value));
}

/// Add a `KEY=VALUE` entry, replacing any existing entry for the key.
pub fn add(env: &mut Vec<String>, entry: &str) {
    let key = key_of(entry);
    if let Some(existing) = env.iter_mut().find(|e| key_of(e) == key) {
        *existing = entry.to_string();
    } else {
        env.push(entry.to_string());
    }
}

/// Append every entry of `extra`, replacing duplicated keys.
pub fn merge(env: &mut Vec<String>, extra: &[String]) {
    for entry in extra {
        add(env, entry);
    }
}

/// Expand `$NAME` and `${NAME}` references in `template` against `reference`.
///
/// `$$` produces a literal `$`. References to unknown variables are an
/// error rather than expanding to the empty string, so a bad instance
/// template fails loudly instead of silently collapsing instances.
pub fn expand(template: &str, reference: &[String]) -> Result<String, ExpandError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(ExpandError::Unterminated),
                    }
                }
                out.push_str(resolve(&name, reference)?);
            }
            _ => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(resolve(&name, reference)?);
            }
        }
    }

    Ok(out)
}

fn resolve<'a>(name: &str, reference: &'a [String]) -> Result<&'a str, ExpandError> {
    if name.is_empty() {
        return Err(ExpandError::Unterminated);
    }
    lookup(reference, name).ok_or_else(|| ExpandError::UnknownVariable(name.to_string()))
}

#[cfg(test)]
#[path = "environ_tests.rs"]
mod tests;
