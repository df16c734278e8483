// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The installed-package database: one [`InstalledRecord`] per installed
//! name, written to `<installed_dir>/<name>.meta` via write-temp-then-
//! rename so readers only ever observe a complete file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;
use thiserror::Error;

use crate::{dependency::DepVersions, evr::Evr};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstalledRecord {
    pub name: String,
    pub evr: Evr,
    pub target_root: PathBuf,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub install_time: DateTime<Utc>,
    pub build_time: DateTime<Utc>,
    pub deps: Vec<String>,
    pub dep_versions: DepVersions,
    pub environment_fingerprint: String,
    pub abi_fingerprint: String,
    pub toolchain_fingerprint: String,
}

impl InstalledRecord {
    fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.meta"))
    }

    pub fn load(dir: &Path, name: &str) -> Result<Option<Self>, Error> {
        let path = Self::path_for(dir, name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_yaml::from_str(&text).map_err(|e| Error::Parse(path.clone(), e))?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(path, err)),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(dir).map_err(|e| Error::Io(dir.to_path_buf(), e))?;

        let path = Self::path_for(dir, &self.name);
        let tmp = path.with_extension("meta.tmp");

        let serialized = serde_yaml::to_string(self).map_err(|e| Error::Parse(path.clone(), e))?;
        fs::write(&tmp, serialized).map_err(|e| Error::Io(tmp.clone(), e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::Io(path, e))?;

        Ok(())
    }

    pub fn remove(dir: &Path, name: &str) -> Result<(), Error> {
        let path = Self::path_for(dir, name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(path, err)),
        }
    }

    pub fn list(dir: &Path) -> Result<Vec<Self>, Error> {
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(Error::Io(dir.to_path_buf(), err)),
        };

        let mut records = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::Io(dir.to_path_buf(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| Error::Io(path.clone(), e))?;
            records.push(serde_yaml::from_str(&text).map_err(|e| Error::Parse(path.clone(), e))?);
        }

        records.sort_by(|a: &InstalledRecord, b: &InstalledRecord| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Names of every other installed package that lists `self.name`
    /// among its declared `deps`.
    pub fn reverse_deps(dir: &Path, name: &str) -> Result<Vec<String>, Error> {
        Ok(Self::list(dir)?
            .into_iter()
            .filter(|r| r.name != name && r.deps.iter().any(|d| d == name))
            .map(|r| r.name)
            .collect())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("malformed installed record {0:?}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;

    fn sample(name: &str, deps: Vec<String>) -> InstalledRecord {
        InstalledRecord {
            name: name.to_string(),
            evr: Evr::new(0, "1.0", 1),
            target_root: PathBuf::from("/"),
            archive_path: PathBuf::from("/var/lib/warden/packages/x.tar.zst"),
            manifest_path: PathBuf::from("/var/lib/warden/manifests/x.manifest"),
            install_time: Utc::now(),
            build_time: Utc::now(),
            deps,
            dep_versions: BTreeMap::new(),
            environment_fingerprint: "abc".into(),
            abi_fingerprint: "def".into(),
            toolchain_fingerprint: "ghi".into(),
        }
    }

    #[test]
    fn saves_and_reloads_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample("zlib", vec![]);
        record.save(dir.path()).unwrap();

        let loaded = InstalledRecord::load(dir.path(), "zlib").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(!dir.path().join("zlib.meta.tmp").exists());
    }

    #[test]
    fn missing_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InstalledRecord::load(dir.path(), "missing").unwrap().is_none());
    }

    #[test]
    fn reverse_deps_finds_dependents() {
        let dir = tempfile::tempdir().unwrap();
        sample("zlib", vec![]).save(dir.path()).unwrap();
        sample("libpng", vec!["zlib".to_string()]).save(dir.path()).unwrap();

        let deps = InstalledRecord::reverse_deps(dir.path(), "zlib").unwrap();
        assert_eq!(deps, vec!["libpng".to_string()]);
    }
}
