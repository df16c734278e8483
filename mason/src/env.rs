// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::util;

/// Resolved set of directories mason operates under, plus the config
/// manager used to load recipe-store overrides and the parsed
/// key=value tunables (verbosity, job counts, mirrors, retry policy).
pub struct Env {
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Root of the target installation this build should fingerprint
    /// and query against (a `warden::Installation` root), `/` when run
    /// as root.
    pub install_root: PathBuf,
    pub config: config::Manager,
    pub tunables: config::Tunables,
}

impl Env {
    pub fn new(
        cache_dir: Option<PathBuf>,
        config_dir: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        install_root: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let is_root = util::is_root();

        let resolved_config_dir = config_dir.clone().unwrap_or_else(|| default_config_dir(is_root));

        let config = if let Some(dir) = config_dir {
            config::Manager::custom(dir)
        } else if is_root {
            config::Manager::system("/", "mason")
        } else {
            config::Manager::user("mason").ok_or(Error::UserConfig)?
        };

        let tunables = config::Tunables::load(&resolved_config_dir).unwrap_or_default();

        let cache_dir = resolve_cache_dir(is_root, cache_dir)?;
        let data_dir = resolve_data_dir(data_dir);
        let install_root = resolve_install_root(is_root, install_root)?;

        util::ensure_dir_exists(&cache_dir)?;
        util::ensure_dir_exists(&data_dir)?;
        util::ensure_dir_exists(&install_root)?;

        Ok(Self {
            config,
            tunables,
            cache_dir,
            data_dir,
            install_root,
        })
    }
}

fn default_config_dir(is_root: bool) -> PathBuf {
    if is_root {
        PathBuf::from("/etc/mason")
    } else {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("mason")
    }
}

fn resolve_cache_dir(is_root: bool, custom: Option<PathBuf>) -> Result<PathBuf, Error> {
    if let Some(dir) = custom {
        Ok(dir)
    } else if is_root {
        Ok(PathBuf::from("/var/cache/mason"))
    } else {
        Ok(dirs::cache_dir().ok_or(Error::UserCache)?.join("mason"))
    }
}

fn resolve_data_dir(custom: Option<PathBuf>) -> PathBuf {
    custom.unwrap_or_else(|| "/usr/share/mason".into())
}

fn resolve_install_root(is_root: bool, custom: Option<PathBuf>) -> Result<PathBuf, Error> {
    if let Some(dir) = custom {
        Ok(dir)
    } else if is_root {
        Ok(PathBuf::from("/"))
    } else {
        Ok(dirs::cache_dir().ok_or(Error::UserCache)?.join("mason-root"))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find cache dir, $XDG_CACHE_HOME or $HOME env not set")]
    UserCache,
    #[error("cannot find config dir, $XDG_CONFIG_HOME or $HOME env not set")]
    UserConfig,
    #[error("io")]
    Io(#[from] io::Error),
}
