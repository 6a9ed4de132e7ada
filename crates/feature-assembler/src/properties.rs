//! Flat string properties (feature `build.properties`).
//!
//! Iteration order is the order entries were read, which is the order the
//! permission scan visits them.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value. Re-setting a key keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comma-separated list value, trimmed, empty items dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    /// Parse Java `.properties` text (`key=value`, `key: value`, `#`/`!`
    /// comments, backslash line continuations).
    pub fn parse(text: &str) -> Self {
        let mut out = Self::new();
        let mut logical = String::new();
        for raw in text.lines() {
            let line = if logical.is_empty() {
                raw.trim_start()
            } else {
                raw.trim()
            };
            if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }
            if ends_with_continuation(line) {
                logical.push_str(&line[..line.len() - 1]);
                continue;
            }
            logical.push_str(line);
            if let Some((k, v)) = split_entry(&logical) {
                out.set(k, v);
            }
            logical.clear();
        }
        if let Some((k, v)) = split_entry(&logical) {
            out.set(k, v);
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read properties {}: {e}", path.display())))?;
        Ok(Self::parse(&data))
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.set(k, v);
        }
        out
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let table = toml::Table::deserialize(deserializer)?;
        let mut out = Self::new();
        flatten_into(&mut out, "", &table);
        Ok(out)
    }
}

// Dotted TOML keys like `root.linux.gtk.x86 = "..."` arrive as nested tables.
fn flatten_into(out: &mut Properties, prefix: &str, table: &toml::Table) {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::Table(t) => flatten_into(out, &key, t),
            toml::Value::String(s) => out.set(key, s.clone()),
            toml::Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|i| match i {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                out.set(key, joined);
            }
            other => out.set(key, other.to_string()),
        }
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' => {
                let key = unescape(line[..i].trim_end());
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return Some((key, unescape(rest.trim_start())));
            }
            _ => {}
        }
    }
    Some((unescape(line), String::new()))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut it = s.chars();
    while let Some(c) = it.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match it.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
