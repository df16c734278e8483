// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    env, io,
    path::{Path, PathBuf},
    process::Command,
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use thiserror::Error;

pub type Parsed = recipe::Recipe;

/// A recipe loaded from disk: the parsed form plus the bits mason
/// needs that live outside it (its path, for relative source lookups,
/// and the build timestamp baked into `SOURCE_DATE_EPOCH`).
#[derive(Debug)]
pub struct Recipe {
    pub path: PathBuf,
    pub parsed: Parsed,
    pub build_time: DateTime<Utc>,
}

impl Recipe {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = resolve_path(path)?;
        let parsed = recipe::load(&path)?;
        let build_time = resolve_build_time(&path);

        Ok(Self {
            path,
            parsed,
            build_time,
        })
    }

    /// Finds `name` in `user_dir` (writable overrides) then `system_dir`
    /// (read-only) and loads it.
    pub fn resolve(name: &str, user_dir: &Path, system_dir: &Path) -> Result<Self, Error> {
        let path = recipe::resolve(name, user_dir, system_dir)?;
        Self::load(path)
    }

    pub fn nvr(&self) -> String {
        self.parsed.nvr()
    }

    pub fn deps(&self) -> &[String] {
        self.parsed.deps()
    }

    pub fn build_deps(&self) -> &[String] {
        self.parsed.build_deps()
    }

    pub fn lint(&self) -> Result<(), recipe::Error> {
        self.parsed.lint()
    }

    /// The build-variable overlay for `profile`, falling back to the
    /// root `build` section when no profile of that name is declared.
    pub fn build_for_profile(&self, profile: Option<&str>) -> &recipe::Build {
        match profile.and_then(|name| self.parsed.profiles.iter().find(|kv| kv.key == name)) {
            Some(kv) => &kv.value,
            None => &self.parsed.build,
        }
    }
}

fn resolve_path(path: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let path = path.as_ref();

    let path = if path.is_dir() {
        path.join(format!(
            "{}.recipe",
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
        ))
    } else {
        path.to_path_buf()
    };

    fs::canonicalize(&path).map_err(|_| Error::MissingRecipe(path))
}

fn resolve_build_time(path: &Path) -> DateTime<Utc> {
    if let Ok(epoch_env) = env::var("SOURCE_DATE_EPOCH") {
        if let Ok(parsed) = epoch_env.parse::<i64>() {
            if let Some(timestamp) = DateTime::from_timestamp(parsed, 0) {
                return timestamp;
            }
        }
    }

    if let Some(recipe_dir) = path.parent() {
        if let Ok(git_log) = Command::new("git")
            .args(["log", "-1", "--format=%at"])
            .current_dir(recipe_dir)
            .output()
        {
            if let Ok(stdout) = String::from_utf8(git_log.stdout) {
                if let Ok(parsed) = stdout.trim().parse::<i64>() {
                    if let Some(timestamp) = DateTime::from_timestamp(parsed, 0) {
                        return timestamp;
                    }
                }
            }
        }
    }

    Utc::now()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("recipe file does not exist: {0:?}")]
    MissingRecipe(PathBuf),
    #[error("resolve recipe")]
    Resolve(#[from] recipe::Error),
    #[error("load recipe")]
    Load(#[from] io::Error),
}
