// SPDX-FileCopyrightText: Copyright © 2020-2023 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    fmt,
    path::{Path, PathBuf},
};

use fs_err as fs;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use locks::{Guard, Lock, LockError};
pub use tunables::{ColorMode, ParseError, Tunables};

mod locks;
mod tunables;

const EXTENSION: &str = "yaml";

/// A structured, domain-scoped config type. Each domain may be spread
/// across several files (vendor defaults, admin overrides, user
/// overrides); [`Config::merge`] folds them into one value, last-wins.
pub trait Config: DeserializeOwned {
    fn domain() -> String;

    fn merge(self, other: Self) -> Self;
}

#[derive(Debug, Clone)]
pub struct Manager {
    program: String,
    scope: Scope,
}

impl Manager {
    pub fn system(root: impl Into<PathBuf>, program: impl ToString) -> Self {
        Self {
            program: program.to_string(),
            scope: Scope::System(root.into()),
        }
    }

    pub fn user(program: impl ToString) -> Option<Self> {
        Some(Self {
            program: program.to_string(),
            scope: Scope::User(dirs::config_dir()?),
        })
    }

    /// Load configs from an arbitrary root, treated as a system scope
    /// rooted at `path` with no vendor/admin split.
    pub fn custom(path: impl Into<PathBuf>) -> Self {
        Self {
            program: String::new(),
            scope: Scope::Custom(path.into()),
        }
    }

    pub fn load<T: Config>(&self) -> Vec<T> {
        let domain = T::domain();

        let mut configs = vec![];

        let searches = match &self.scope {
            Scope::System(root) => vec![
                (Entry::File, Search::System { root, base: Base::Vendor }),
                (Entry::Directory, Search::System { root, base: Base::Vendor }),
                (Entry::File, Search::System { root, base: Base::Admin }),
                (Entry::Directory, Search::System { root, base: Base::Admin }),
            ],
            Scope::User(root) => vec![(Entry::Directory, Search::Home(root))],
            Scope::Custom(root) => vec![
                (Entry::File, Search::Custom(root)),
                (Entry::Directory, Search::Custom(root)),
            ],
        };

        for (entry, search) in searches {
            for path in enumerate_paths(entry, search, &self.program, &domain) {
                if let Some(config) = read_config(&path) {
                    configs.push(config);
                } else {
                    log::debug!("skipping unreadable or malformed config at {path:?}");
                }
            }
        }

        configs
    }

    /// Load and merge, returning `None` if no domain file was found.
    pub fn load_merged<T: Config>(&self) -> Option<T> {
        self.load().into_iter().reduce(T::merge)
    }

    pub fn save<T: Config + Serialize>(&self, name: impl fmt::Display, config: &T) -> Result<(), SaveError> {
        let domain = T::domain();

        let search = match &self.scope {
            Scope::System(root) => Search::System { root, base: Base::Admin },
            Scope::User(root) => Search::Home(root),
            Scope::Custom(root) => Search::Custom(root),
        };
        let dir = search.dir(&self.program, &domain);

        fs::create_dir_all(&dir).map_err(|io| SaveError::CreateDir(dir.clone(), io))?;

        let path = dir.join(format!("{name}.{EXTENSION}"));
        let serialized = serde_yaml::to_string(config)?;

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, serialized).map_err(|io| SaveError::Write(tmp.clone(), io))?;
        fs::rename(&tmp, &path).map_err(|io| SaveError::Write(path, io))?;

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("create config dir {0:?}")]
    CreateDir(PathBuf, #[source] std::io::Error),
    #[error("serialize config")]
    Yaml(#[from] serde_yaml::Error),
    #[error("write config file {0:?}")]
    Write(PathBuf, #[source] std::io::Error),
}

fn enumerate_paths(entry: Entry, search: Search<'_>, program: &str, domain: &str) -> Vec<PathBuf> {
    match entry {
        Entry::File => {
            let file = search.file(program, domain);
            if file.exists() {
                vec![file]
            } else {
                vec![]
            }
        }
        Entry::Directory => {
            let Ok(read_dir) = fs::read_dir(search.dir(program, domain)) else {
                return vec![];
            };

            read_dir
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION))
                .collect()
        }
    }
}

fn read_config<T: Config>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    serde_yaml::from_slice(&bytes).ok()
}

#[derive(Clone, Copy)]
enum Base {
    Admin,
    Vendor,
}

impl Base {
    fn path(&self) -> &'static str {
        match self {
            Base::Admin => "etc",
            Base::Vendor => "usr/share",
        }
    }
}

enum Entry {
    File,
    Directory,
}

enum Search<'a> {
    System { root: &'a Path, base: Base },
    Home(&'a Path),
    Custom(&'a Path),
}

impl<'a> Search<'a> {
    fn file(&self, program: &str, domain: &str) -> PathBuf {
        match self {
            Search::System { root, base } => root.join(base.path()).join(program),
            Search::Home(root) => root.join(program),
            Search::Custom(root) => (*root).to_path_buf(),
        }
        .join(format!("{domain}.{EXTENSION}"))
    }

    fn dir(&self, program: &str, domain: &str) -> PathBuf {
        match self {
            Search::System { root, base } => root.join(base.path()).join(program).join(format!("{domain}.d")),
            Search::Home(root) => root.join(program).join(domain),
            Search::Custom(root) => (*root).to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
enum Scope {
    System(PathBuf),
    User(PathBuf),
    Custom(PathBuf),
}
