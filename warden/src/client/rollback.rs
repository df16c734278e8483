// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Restores a package to a previously recorded EVR: the current
//! installation is removed, then either the target archive is
//! reinstalled if the caller still has it, or the EVR's rollback bundle
//! is unpacked directly and a minimal [`InstalledRecord`] rebuilt around
//! the preserved manifest.

use std::{
    path::PathBuf,
    time::Duration,
};

use chrono::Utc;
use config::{Lock, LockError};
use fs_err as fs;
use thiserror::Error;

use super::install::{self, NewPackage};
use crate::{
    evr::Evr,
    history::{self, Action, Event},
    installation::Installation,
    record::{self, InstalledRecord},
    rollback,
};

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Rolls `name` back to `target_evr`. If `archive` is given it is
/// installed exactly as [`install::install_pkg`] would; otherwise the
/// rollback bundle captured for `target_evr` is restored in place.
pub fn rollback_pkg(
    installation: &Installation,
    name: &str,
    target_evr: &Evr,
    archive: Option<NewPackage>,
) -> Result<InstalledRecord, Error> {
    let lock = Lock::new(installation.locks_dir(), format!("install-{name}"));
    let _guard = lock.acquire(LOCK_TIMEOUT)?;

    let current = InstalledRecord::load(&installation.installed_dir(), name)?;
    let from_evr = current.as_ref().map(|r| r.evr.clone());

    if current.is_some() {
        install::uninstall(installation, name, true)?;
    }

    let record = match archive {
        Some(pkg) => install::install_pkg(installation, pkg)?,
        None => restore_from_bundle(installation, name, target_evr)?,
    };

    history::append(
        &installation.history_dir(),
        name,
        &Event {
            timestamp: Utc::now(),
            action: Action::Rollback,
            from_evr,
            to_evr: Some(target_evr.clone()),
        },
    )?;

    Ok(record)
}

fn restore_from_bundle(installation: &Installation, name: &str, target_evr: &Evr) -> Result<InstalledRecord, Error> {
    let compression = rollback::bundle_compression(&installation.rollback_dir(), name, target_evr)
        .ok_or_else(|| Error::BundleMissing(name.to_string(), target_evr.clone()))?;

    let manifest = rollback::restore(
        &installation.rollback_dir(),
        name,
        target_evr,
        &installation.root,
        compression,
    )?;

    let manifest_path = installation.manifests_dir().join(format!("{name}.manifest"));
    if let Some(parent) = manifest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;
    }
    fs::write(&manifest_path, manifest.render()).map_err(|e| Error::Io(manifest_path.clone(), e))?;

    let record = InstalledRecord {
        name: name.to_string(),
        evr: target_evr.clone(),
        target_root: installation.root.clone(),
        archive_path: PathBuf::new(),
        manifest_path,
        install_time: Utc::now(),
        build_time: Utc::now(),
        deps: vec![],
        dep_versions: Default::default(),
        environment_fingerprint: String::new(),
        abi_fingerprint: String::new(),
        toolchain_fingerprint: String::new(),
    };
    record.save(&installation.installed_dir())?;

    Ok(record)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("lock")]
    Lock(#[from] LockError),
    #[error("install")]
    Install(#[from] install::Error),
    #[error("installed record")]
    Record(#[from] record::Error),
    #[error("history log")]
    History(#[from] history::Error),
    #[error("rollback")]
    Rollback(#[from] rollback::Error),
    #[error("no rollback bundle recorded for {0:?}@{1}")]
    BundleMissing(String, Evr),
}

#[cfg(test)]
mod test {
    use archive::{Compression, Writer};

    use super::*;

    fn build_archive(path: &std::path::Path, contents: &[(&str, &[u8])]) {
        let mut writer = Writer::create(path, Compression::Zstd).unwrap();
        for (name, data) in contents {
            writer.add_file(name, &mut &data[..], 0o644).unwrap();
        }
        writer.finish().unwrap();
    }

    fn new_package(archive_path: PathBuf) -> NewPackage {
        NewPackage {
            archive_path,
            deps: vec![],
            dep_versions: Default::default(),
            environment_fingerprint: "env".into(),
            abi_fingerprint: "abi".into(),
            toolchain_fingerprint: "tool".into(),
            build_time: Utc::now(),
        }
    }

    #[test]
    fn restores_bundle_when_archive_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let installation = Installation::open(root.path());

        let archive_dir = tempfile::tempdir().unwrap();
        let v1 = archive_dir.path().join("zlib-1.3-1.tar.zst");
        build_archive(&v1, &[("usr/lib/libz.so.1.3", b"old")]);
        install::install_pkg(&installation, new_package(v1)).unwrap();

        let v2 = archive_dir.path().join("zlib-1.3.1-1.tar.zst");
        build_archive(&v2, &[("usr/lib/libz.so.1.3.1", b"new")]);
        install::install_pkg(&installation, new_package(v2)).unwrap();
        assert!(root.path().join("usr/lib/libz.so.1.3.1").exists());

        let target_evr = Evr::new(0, "1.3", 1);
        let record = rollback_pkg(&installation, "zlib", &target_evr, None).unwrap();

        assert_eq!(record.evr, target_evr);
        assert!(root.path().join("usr/lib/libz.so.1.3").exists());
        assert!(!root.path().join("usr/lib/libz.so.1.3.1").exists());

        let events: Vec<_> = history::read(&installation.history_dir(), "zlib").unwrap();
        assert!(matches!(events.last().unwrap().action, Action::Rollback));
    }
}
