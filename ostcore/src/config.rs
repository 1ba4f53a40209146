//! A small INI/keyfile reader and writer (spec §4.1, §6 "Config keys").
//!
//! The original implementation parses this with `glib::KeyFile`; this
//! engine does not link glib, so the shape of the teacher's
//! `KeyFileExt::optional_string`/`optional_bool` helpers (missing group or
//! key maps to `Ok(None)` rather than an error) is reproduced over a
//! hand-rolled reader instead. The grammar is deliberately small: `[group]`
//! headers, `key=value` pairs, `#`/`;` comments, blank lines ignored.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A parsed keyfile: an ordered-by-name map of group name to its
/// key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl KeyFile {
    /// An empty keyfile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse keyfile text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(stripped) = line.strip_prefix('[') {
                let name = stripped.strip_suffix(']').ok_or_else(|| {
                    Error::invalid_config(format!("unterminated group header at line {}", lineno + 1))
                })?;
                groups.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                continue;
            }
            let group = current.as_ref().ok_or_else(|| {
                Error::invalid_config(format!("key outside any group at line {}", lineno + 1))
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::invalid_config(format!("malformed key=value at line {}", lineno + 1))
            })?;
            groups
                .entry(group.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { groups })
    }

    /// Render back to keyfile text.
    pub fn to_string_repr(&self) -> String {
        let mut out = String::new();
        for (group, kvs) in &self.groups {
            let _ = writeln!(out, "[{group}]");
            for (k, v) in kvs {
                let _ = writeln!(out, "{k}={v}");
            }
        }
        out
    }

    /// Raw string lookup; `None` if the group or key is absent.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    /// Like [`Self::get`] but required; errors if absent.
    pub fn require(&self, group: &str, key: &str) -> Result<&str> {
        self.get(group, key)
            .ok_or_else(|| Error::invalid_config(format!("missing [{group}] {key}")))
    }

    /// String getter returning `None` on missing group/key, matching the
    /// teacher's `KeyFileExt::optional_string`.
    pub fn optional_string(&self, group: &str, key: &str) -> Option<String> {
        self.get(group, key).map(str::to_string)
    }

    /// Boolean getter returning `None` on missing group/key, matching the
    /// teacher's `KeyFileExt::optional_bool`. Accepts `true`/`false`.
    pub fn optional_bool(&self, group: &str, key: &str) -> Result<Option<bool>> {
        match self.get(group, key) {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(Error::invalid_config(format!(
                "invalid boolean for [{group}] {key}: {other}"
            ))),
        }
    }

    /// Integer getter returning `None` on missing group/key.
    pub fn optional_u64(&self, group: &str, key: &str) -> Result<Option<u64>> {
        match self.get(group, key) {
            None => Ok(None),
            Some(s) => s
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::invalid_config(format!("invalid integer for [{group}] {key}: {s}"))),
        }
    }

    /// Comma-separated string-list getter.
    pub fn optional_string_list(&self, group: &str, key: &str) -> Option<Vec<String>> {
        self.get(group, key)
            .map(|s| s.split(';').filter(|v| !v.is_empty()).map(str::to_string).collect())
    }

    /// Set a scalar value, creating the group if needed.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove an entire group. Returns `true` if it was present.
    pub fn remove_group(&mut self, group: &str) -> bool {
        self.groups.remove(group).is_some()
    }

    /// Iterate over group names.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// True if `group` exists.
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Iterate over `(key, value)` pairs of a group.
    pub fn group_entries(&self, group: &str) -> impl Iterator<Item = (&str, &str)> {
        self.groups
            .get(group)
            .into_iter()
            .flat_map(|kvs| kvs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}
