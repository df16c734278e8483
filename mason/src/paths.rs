// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{io, path::PathBuf};

use crate::{recipe::Recipe, util};

/// `<name>-<version>-<release>`, the stem every per-recipe working
/// directory is keyed by so concurrent builds of different recipes
/// never collide.
#[derive(Debug, Clone)]
pub struct Id(String);

impl Id {
    pub fn new(recipe: &Recipe) -> Self {
        Self(recipe.nvr())
    }
}

/// A host/guest path pair. `guest` only matters for the chroot build
/// variant, where the host path is bind-mounted or rsync'd to
/// the guest path inside `/mnt/lfs/build/...`.
pub struct Mapping {
    pub host: PathBuf,
    pub guest: PathBuf,
}

#[derive(Debug)]
pub struct Paths {
    id: Id,
    host_root: PathBuf,
    guest_root: PathBuf,
    recipe_dir: PathBuf,
}

impl Paths {
    pub fn new(recipe: &Recipe, host_root: impl Into<PathBuf>, guest_root: impl Into<PathBuf>) -> io::Result<Self> {
        let id = Id::new(recipe);

        let recipe_dir = recipe.path.parent().unwrap_or(&PathBuf::default()).canonicalize()?;

        let paths = Self {
            id,
            host_root: host_root.into().canonicalize()?,
            guest_root: guest_root.into(),
            recipe_dir,
        };

        util::ensure_dir_exists(&paths.sources().host)?;
        util::ensure_dir_exists(&paths.build().host)?;
        util::ensure_dir_exists(&paths.destdir().host)?;
        util::ensure_dir_exists(&paths.artefacts().host)?;

        Ok(paths)
    }

    /// Fetched and extracted upstream sources, shared across
    /// every build of this recipe's `(name, version)`.
    pub fn sources(&self) -> Mapping {
        Mapping {
            host: self.host_root.join("sources").join(&self.id.0),
            guest: self.guest_root.join("sources"),
        }
    }

    /// Working copy the source archive is extracted and patched into;
    /// recreated empty at the start of every build.
    pub fn build(&self) -> Mapping {
        Mapping {
            host: self.host_root.join("build").join(&self.id.0),
            guest: self.guest_root.join("build"),
        }
    }

    /// `DESTDIR` the install stage writes into; guaranteed empty at
    /// stage start.
    pub fn destdir(&self) -> Mapping {
        Mapping {
            host: self.host_root.join("destdir").join(&self.id.0),
            guest: self.guest_root.join("destdir"),
        }
    }

    pub fn artefacts(&self) -> Mapping {
        Mapping {
            host: self.host_root.join("artefacts").join(&self.id.0),
            guest: self.guest_root.join("artefacts"),
        }
    }

    pub fn recipe(&self) -> Mapping {
        Mapping {
            host: self.recipe_dir.clone(),
            guest: self.guest_root.join("recipe"),
        }
    }

    /// Root the chroot variant is built under: `/mnt/lfs/build/<id>`.
    pub fn chroot_root(&self) -> PathBuf {
        PathBuf::from("/mnt/lfs/build").join(&self.id.0)
    }

    /// Maps a guest-relative path onto its actual host location, for
    /// rsync'ing results back out of the chroot variant.
    pub fn guest_host_path(&self, mapping: &Mapping) -> PathBuf {
        let relative = mapping.guest.strip_prefix("/").unwrap_or(&mapping.guest);
        self.chroot_root().join(relative)
    }
}
