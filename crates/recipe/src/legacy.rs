// SPDX-FileCopyrightText: Copyright © 2020-2023 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Converts the old `key = value` / `key[] = value` flat recipe format
//! into the structured descriptor, re-serialized with [`yaml::format`]
//! so the result reads like a hand-written recipe rather than a dump.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed legacy line {0:?}")]
    Syntax(String),
    #[error("format converted recipe: {0}")]
    Format(#[from] yaml::format::Error),
}

/// Parses a legacy recipe and renders it as a new-style YAML recipe.
/// Scalars become top-level keys; `foo[]` keys collect into sequences
/// in first-seen order; `sourceN_hash` style pairs are merged into
/// `sources:`/`patches:` entries.
pub fn convert(input: &str) -> Result<String, Error> {
    let mut scalars: BTreeMap<String, String> = BTreeMap::new();
    let mut sequences: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (lineno, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::Syntax(format!("line {}: {raw:?}", lineno + 1)))?;
        let key = key.trim();
        let value = value.trim().trim_matches('"').to_string();

        if let Some(base) = key.strip_suffix("[]") {
            sequences.entry(base.trim().to_string()).or_default().push(value);
        } else {
            scalars.insert(key.to_string(), value);
        }
    }

    let mut root = Mapping::new();

    for key in ["name", "version", "summary", "homepage", "license"] {
        if let Some(value) = scalars.get(key) {
            root.insert(Value::from(key), Value::from(value.as_str()));
        }
    }
    if let Some(release) = scalars.get("release").and_then(|v| v.parse::<u64>().ok()) {
        root.insert(Value::from("release"), Value::from(release));
    }
    if let Some(epoch) = scalars.get("epoch").and_then(|v| v.parse::<u64>().ok()) {
        root.insert(Value::from("epoch"), Value::from(epoch));
    }

    if let Some(urls) = sequences.get("source") {
        let hashes = sequences.get("source_hash").cloned().unwrap_or_default();
        root.insert(Value::from("sources"), artifact_sequence(urls, &hashes));
    }
    if let Some(urls) = sequences.get("patch") {
        let hashes = sequences.get("patch_hash").cloned().unwrap_or_default();
        root.insert(Value::from("patches"), artifact_sequence(urls, &hashes));
    }

    for key in ["prepare", "build", "install", "check"] {
        if let Some(value) = scalars.get(key) {
            root.insert(Value::from(key), Value::from(value.as_str()));
        }
    }

    for (legacy_key, new_key) in [("deps", "rundeps"), ("builddeps", "builddeps")] {
        if let Some(values) = sequences.get(legacy_key) {
            root.insert(
                Value::from(new_key),
                Value::Sequence(values.iter().map(|v| Value::from(v.as_str())).collect()),
            );
        }
    }

    yaml::format(&Value::Mapping(root)).map_err(Error::Format)
}

fn artifact_sequence(urls: &[String], hashes: &[String]) -> Value {
    Value::Sequence(
        urls.iter()
            .enumerate()
            .map(|(i, url)| {
                let mut entry = Mapping::new();
                entry.insert(Value::from("url"), Value::from(url.as_str()));
                entry.insert(Value::from("hash"), Value::from(hashes.get(i).cloned().unwrap_or_default()));
                Value::Mapping(entry)
            })
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    const LEGACY: &str = r#"
name = zlib
version = 1.3
release = 1
source[] = https://zlib.net/zlib-1.3.tar.gz
source_hash[] = ff0ba4c292013dbc27530b3a81e1f9a813cd39de01ca5e0f8bf04d8c3721cdb
build = ./configure --prefix=/usr && make
install = make install
deps[] = libc
"#;

    #[test]
    fn converts_scalars_and_sequences() {
        let yaml = convert(LEGACY).unwrap();
        assert!(yaml.contains("name"));
        assert!(yaml.contains("zlib"));
        assert!(yaml.contains("sources"));
        assert!(yaml.contains("ff0ba4c292013dbc27530b3a81e1f9a813cd39de01ca5e0f8bf04d8c3721cdb"));
    }

    #[test]
    fn rejects_lines_without_equals() {
        assert!(convert("name zlib").is_err());
    }
}
