// SPDX-FileCopyrightText: Copyright © 2020-2023 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub mod legacy;
pub mod script;

pub fn from_slice(bytes: &[u8]) -> Result<Recipe, serde_yaml::Error> {
    serde_yaml::from_slice(bytes)
}

/// Searches the user-writable recipe store before the read-only system
/// store; the first hit wins. Accepts either `<name>.recipe` directly or
/// `<name>/<name>.recipe`.
pub fn resolve(name: &str, user_dir: &Path, system_dir: &Path) -> Result<std::path::PathBuf, Error> {
    for dir in [user_dir, system_dir] {
        for candidate in [dir.join(format!("{name}.recipe")), dir.join(name).join(format!("{name}.recipe"))] {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(Error::NotFound(name.to_string()))
}

pub fn load(path: &Path) -> Result<Recipe, Error> {
    let bytes = fs::read(path).map_err(|_| Error::NotFound(path.display().to_string()))?;
    from_slice(&bytes).map_err(|e| Error::Parse(e.to_string()))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("recipe not found: {0}")]
    NotFound(String),
    #[error("parse recipe: {0}")]
    Parse(String),
    #[error("lint {field}: {reason}")]
    Lint { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    #[serde(flatten)]
    pub source: Source,
    #[serde(flatten)]
    pub build: Build,
    #[serde(flatten)]
    pub package: Package,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub sources: Vec<SourceArtifact>,
    #[serde(default)]
    pub patches: Vec<SourceArtifact>,
    pub git: Option<GitSource>,
    #[serde(default, deserialize_with = "sequence_of_key_value")]
    pub profiles: Vec<KeyValue<Build>>,
    #[serde(default)]
    pub architectures: Vec<String>,
}

/// A declared source or patch: a URL paired with its expected hash,
/// positional so that `|sources| == |sources.hashes|` holds by
/// construction rather than by separate invariant check.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceArtifact {
    pub url: Url,
    pub hash: String,
    /// Directory levels to strip before applying; only meaningful for
    /// patches, ignored for sources.
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSource {
    pub url: Url,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(default)]
    pub epoch: u64,
    pub version: String,
    pub release: u64,
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "single_as_sequence")]
    pub license: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Build {
    pub prepare: Option<String>,
    pub build: Option<String>,
    pub install: Option<String>,
    pub check: Option<String>,
    pub environment: Option<String>,
    #[serde(default, rename = "builddeps")]
    pub build_deps: Vec<String>,
    #[serde(default, rename = "checkdeps")]
    pub check_deps: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub toolchain: Toolchain,
    #[serde(default = "default_true")]
    pub strip: bool,
    #[serde(default)]
    pub prefer_chroot: bool,
    #[serde(default)]
    pub reproducible_epoch: bool,
    #[serde(default)]
    pub lock_deps: bool,
    #[serde(default)]
    pub networking: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default, rename = "rundeps")]
    pub run_deps: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
    #[default]
    Llvm,
    Gnu,
}

#[derive(Debug, Clone)]
pub struct KeyValue<T> {
    pub key: String,
    pub value: T,
}

fn default_true() -> bool {
    true
}

impl Recipe {
    /// Name-version-release tuple, the canonical on-disk stem.
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.source.name, self.source.version, self.source.release)
    }

    pub fn deps(&self) -> &[String] {
        &self.package.run_deps
    }

    pub fn build_deps(&self) -> &[String] {
        &self.build.build_deps
    }

    /// Verifies the invariants from the data model: name/version
    /// non-empty, a git ref whenever a git url is present, and at
    /// least one source of input unless the recipe only installs
    /// pre-staged content (no `build`/`prepare` step declared).
    pub fn lint(&self) -> Result<(), Error> {
        if self.source.name.trim().is_empty() {
            return Err(Error::Lint {
                field: "name",
                reason: "must not be empty".into(),
            });
        }
        if self.source.version.trim().is_empty() {
            return Err(Error::Lint {
                field: "version",
                reason: "must not be empty".into(),
            });
        }

        let pure_inline = self.build.prepare.is_none() && self.build.build.is_none();
        if self.sources.is_empty() && self.git.is_none() && !pure_inline {
            return Err(Error::Lint {
                field: "sources",
                reason: "recipe has a build step but declares no sources or git upstream".into(),
            });
        }

        Ok(())
    }
}

/// Deserialize a single value or sequence of values as a vec
fn single_as_sequence<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::de::Deserializer<'de>,
{
    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum Value<T> {
        Single(T),
        Sequence(Vec<T>),
    }

    match Value::deserialize(deserializer)? {
        Value::Single(value) => Ok(vec![value]),
        Value::Sequence(sequence) => Ok(sequence),
    }
}

/// Deserialize a sequence of single entry maps as a vec of [`KeyValue`]
fn sequence_of_key_value<'de, T, D>(deserializer: D) -> Result<Vec<KeyValue<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::de::Deserializer<'de>,
{
    let sequence = Vec::<std::collections::HashMap<String, T>>::deserialize(deserializer)?;

    Ok(sequence
        .into_iter()
        .filter_map(|mut map| map.drain().next())
        .map(|(key, value)| KeyValue { key, value })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    const ZLIB: &str = r#"
name: zlib
version: "1.3"
release: 1
homepage: https://zlib.net
license: Zlib
summary: Compression library
sources:
  - url: https://zlib.net/zlib-1.3.tar.gz
    hash: ff0ba4c292013dbc27530b3a81e1f9a813cd39de01ca5e0f8bf04d8c3721cdb
build: |
  ./configure --prefix=/usr
  make -jN
install: |
  make install
rundeps:
  - libc
"#;

    #[test]
    fn deserialize_basic_recipe() {
        let recipe = from_slice(ZLIB.as_bytes()).unwrap();
        assert_eq!(recipe.source.name, "zlib");
        assert_eq!(recipe.sources.len(), 1);
        assert!(recipe.lint().is_ok());
    }

    #[test]
    fn lint_rejects_empty_name() {
        let mut recipe = from_slice(ZLIB.as_bytes()).unwrap();
        recipe.source.name = "".into();
        assert!(recipe.lint().is_err());
    }

    #[test]
    fn lint_requires_sources_when_build_declared() {
        let mut recipe = from_slice(ZLIB.as_bytes()).unwrap();
        recipe.sources.clear();
        assert!(matches!(recipe.lint(), Err(Error::Lint { field: "sources", .. })));
    }

    #[test]
    fn pure_inline_recipe_needs_no_sources() {
        let mut recipe = from_slice(ZLIB.as_bytes()).unwrap();
        recipe.sources.clear();
        recipe.build.build = None;
        recipe.build.prepare = None;
        assert!(recipe.lint().is_ok());
    }
}
