// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Resolves the on-disk layout rooted at a target root: configuration,
//! caches, locks, the installed-package database, recipe stores and logs.
//! All paths are configurable in principle (via [`Config`](config::Config)
//! overrides); this module supplies the defaults from the external
//! interface table.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use log::{trace, warn};
use nix::unistd::{access, AccessFlags, Uid};

use crate::APP_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutability::ReadOnly => "read-only".fmt(f),
            Mutability::ReadWrite => "read-write".fmt(f),
        }
    }
}

/// A resolved target root together with every directory the rest of the
/// system needs, computed once at startup.
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    pub mutability: Mutability,
}

impl Installation {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();

        let mutability = if Uid::effective().is_root() {
            Mutability::ReadWrite
        } else if access(&root, AccessFlags::W_OK).is_ok() {
            Mutability::ReadWrite
        } else {
            Mutability::ReadOnly
        };

        trace!("mutability: {mutability}");
        trace!("root dir: {root:?}");

        if matches!(mutability, Mutability::ReadWrite) {
            if let Err(err) = ensure_dirs_exist(&root) {
                warn!("failed to create one or more {APP_NAME} directories under {root:?}: {err}");
            }
        }

        Self { root, mutability }
    }

    pub fn read_only(&self) -> bool {
        matches!(self.mutability, Mutability::ReadOnly)
    }

    fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.join(format!("etc/{APP_NAME}"))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config")
    }

    pub fn config_dropins_dir(&self) -> PathBuf {
        self.config_dir().join("config.d")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.config_dir().join("hooks")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.config_dir().join("keys")
    }

    pub fn sources_cache_dir(&self) -> PathBuf {
        self.join(format!("var/cache/{APP_NAME}/sources"))
    }

    pub fn git_cache_dir(&self) -> PathBuf {
        self.join(format!("var/cache/{APP_NAME}/tarballs"))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/locks"))
    }

    pub fn installed_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/db/installed"))
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/manifests"))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/packages"))
    }

    pub fn user_recipes_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/recipes"))
    }

    pub fn system_recipes_dir(&self) -> PathBuf {
        self.join(format!("usr/local/share/{APP_NAME}/recipes"))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/history"))
    }

    pub fn rollback_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/rollback"))
    }

    pub fn delta_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/delta"))
    }

    pub fn log_file(&self) -> PathBuf {
        self.join(format!("var/log/{APP_NAME}/{APP_NAME}.log"))
    }

    /// A scratch directory used by the installer and build engine for
    /// staging trees that are about to be overlaid or discarded.
    pub fn staging_dir(&self) -> PathBuf {
        self.join(format!("var/lib/{APP_NAME}/staging"))
    }
}

fn ensure_dirs_exist(root: &Path) -> std::io::Result<()> {
    for path in [
        root.join(format!("etc/{APP_NAME}/hooks")),
        root.join(format!("etc/{APP_NAME}/keys")),
        root.join(format!("etc/{APP_NAME}/config.d")),
        root.join(format!("var/cache/{APP_NAME}/sources")),
        root.join(format!("var/cache/{APP_NAME}/tarballs")),
        root.join(format!("var/lib/{APP_NAME}/locks")),
        root.join(format!("var/lib/{APP_NAME}/db/installed")),
        root.join(format!("var/lib/{APP_NAME}/manifests")),
        root.join(format!("var/lib/{APP_NAME}/packages")),
        root.join(format!("var/lib/{APP_NAME}/recipes")),
        root.join(format!("var/lib/{APP_NAME}/history")),
        root.join(format!("var/lib/{APP_NAME}/rollback")),
        root.join(format!("var/lib/{APP_NAME}/delta")),
        root.join(format!("var/lib/{APP_NAME}/staging")),
        root.join(format!("var/log/{APP_NAME}")),
    ] {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layout_is_rooted_under_the_target_root() {
        let dir = tempfile::tempdir().unwrap();
        let install = Installation::open(dir.path());

        assert_eq!(install.config_file(), dir.path().join("etc/warden/config"));
        assert_eq!(install.installed_dir(), dir.path().join("var/lib/warden/db/installed"));
        assert!(install.installed_dir().is_dir());
    }
}
