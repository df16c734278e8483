// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Installs, removes and upgrades a single package against an
//! [`Installation`]'s target root. Every entry point here holds a named
//! lock for the duration of the operation, so two invocations against
//! the same package never race.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use archive::{Compression, Entry, EntryType, Manifest, Reader};
use chrono::{DateTime, Utc};
use config::{Lock, LockError};
use fs_err as fs;
use hooks::When;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    delta::{self, Delta},
    dependency::DepVersions,
    evr::{Evr, ParseError as EvrParseError},
    history::{self, Action, Event},
    installation::Installation,
    package,
    record::{self, InstalledRecord},
    rollback,
};

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything about a package that isn't recoverable from the archive
/// itself: the dependency graph and build fingerprints a resolver or
/// build record already worked out.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub archive_path: PathBuf,
    pub deps: Vec<String>,
    pub dep_versions: DepVersions,
    pub environment_fingerprint: String,
    pub abi_fingerprint: String,
    pub toolchain_fingerprint: String,
    pub build_time: DateTime<Utc>,
}

/// Decodes `pkg.archive_path`'s filename, extracts it to a staging
/// directory, then overlays it onto `installation.root` in a single
/// pass: regular files are overwritten, directories and symlinks that
/// already exist are left alone, and paths the previous installation of
/// the same package owned but the new one doesn't are removed. If a
/// prior installation exists, its manifest is captured as a rollback
/// bundle first.
pub fn install_pkg(installation: &Installation, pkg: NewPackage) -> Result<InstalledRecord, Error> {
    let filename = package::Filename::parse(&pkg.archive_path)?;
    let stage = if InstalledRecord::load(&installation.installed_dir(), &filename.name)?.is_some() {
        "upgrade"
    } else {
        "install"
    };

    let lock = Lock::new(installation.locks_dir(), format!("install-{}", filename.name));
    let _guard = lock.acquire(LOCK_TIMEOUT)?;

    let staging = installation.staging_dir().join(&filename.name);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| Error::Io(staging.clone(), e))?;
    }
    let manifest = extract_to_staging(&pkg.archive_path, filename.compression, &staging)?;
    let changed_paths: Vec<String> = manifest.entries().iter().map(|e| e.path.clone()).collect();
    let env = hook_env(&filename.name, &installation.root);

    hooks::run(&installation.hooks_dir(), When::Pre, stage, &env, &changed_paths)?;

    let previous = InstalledRecord::load(&installation.installed_dir(), &filename.name)?;

    let evr = Evr::new(0, filename.version.clone(), filename.release.clone());

    if let Some(previous) = &previous {
        let previous_manifest = load_manifest(&previous.manifest_path)?;
        rollback::capture(
            &installation.rollback_dir(),
            &previous.name,
            &previous.evr,
            &installation.root,
            &previous_manifest,
            filename.compression,
        )?;
        delta::write(
            &installation.delta_dir(),
            &previous.name,
            &previous.evr,
            &evr,
            &Delta::compute(&previous_manifest, &manifest),
        )?;
        overlay(&staging, &installation.root, &manifest, Some(&previous_manifest))?;
    } else {
        overlay(&staging, &installation.root, &manifest, None)?;
    }

    fs::remove_dir_all(&staging).ok();

    let manifest_path = installation.manifests_dir().join(format!("{}.manifest", filename.name));
    if let Some(parent) = manifest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;
    }
    fs::write(&manifest_path, manifest.render()).map_err(|e| Error::Io(manifest_path.clone(), e))?;
    let record = InstalledRecord {
        name: filename.name,
        evr: evr.clone(),
        target_root: installation.root.clone(),
        archive_path: pkg.archive_path,
        manifest_path,
        install_time: Utc::now(),
        build_time: pkg.build_time,
        deps: pkg.deps,
        dep_versions: pkg.dep_versions,
        environment_fingerprint: pkg.environment_fingerprint,
        abi_fingerprint: pkg.abi_fingerprint,
        toolchain_fingerprint: pkg.toolchain_fingerprint,
    };
    record.save(&installation.installed_dir())?;

    history::append(
        &installation.history_dir(),
        &record.name,
        &Event {
            timestamp: Utc::now(),
            action: if previous.is_some() { Action::Upgrade } else { Action::Install },
            from_evr: previous.map(|p| p.evr),
            to_evr: Some(evr),
        },
    )?;

    hooks::run(&installation.hooks_dir(), When::Post, stage, &env, &changed_paths)?;

    Ok(record)
}

/// Removes an installed package: files whose content still matches the
/// manifest are deleted outright, files that were modified in place are
/// preserved as `<path>.save`. Empty directories are removed bottom-up.
/// Refuses unless `force` is set when other installed packages still
/// depend on it.
pub fn uninstall(installation: &Installation, name: &str, force: bool) -> Result<(), Error> {
    let lock = Lock::new(installation.locks_dir(), format!("uninstall-{name}"));
    let _guard = lock.acquire(LOCK_TIMEOUT)?;

    let Some(record) = InstalledRecord::load(&installation.installed_dir(), name)? else {
        return Err(Error::NotInstalled(name.to_string()));
    };

    let reverse_deps = InstalledRecord::reverse_deps(&installation.installed_dir(), name)?;
    if !force && !reverse_deps.is_empty() {
        return Err(Error::HasDependents(name.to_string(), reverse_deps));
    }

    let manifest = load_manifest(&record.manifest_path)?;
    let changed_paths: Vec<String> = manifest.entries().iter().map(|e| e.path.clone()).collect();
    let env = hook_env(name, &installation.root);

    hooks::run(&installation.hooks_dir(), When::Pre, "remove", &env, &changed_paths)?;

    let mut dirs = Vec::new();
    for entry in manifest.entries() {
        let rel = entry.path.trim_start_matches('/');
        let dest = installation.root.join(rel);

        match entry.kind {
            EntryType::Directory => dirs.push(dest),
            EntryType::Symlink => {
                fs::remove_file(&dest).or_else(ignore_not_found)?;
            }
            EntryType::Regular => match hash_file(&dest) {
                Ok(current_hash) if Some(&current_hash) == entry.hash.as_ref() => {
                    fs::remove_file(&dest).or_else(ignore_not_found)?;
                }
                Ok(_) => {
                    log::warn!("{dest:?} was modified after install, preserving as .save");
                    fs::rename(&dest, dest.with_extension("save")).or_else(ignore_not_found)?;
                }
                Err(_) => {}
            },
        }
    }

    dirs.sort_by(|a, b| b.cmp(a));
    for dir in dirs {
        let _ = fs::remove_dir(&dir);
    }

    record::InstalledRecord::remove(&installation.installed_dir(), name)?;
    let _ = fs::remove_file(&record.manifest_path);

    history::append(
        &installation.history_dir(),
        name,
        &Event {
            timestamp: Utc::now(),
            action: Action::Save,
            from_evr: Some(record.evr),
            to_evr: None,
        },
    )?;

    hooks::run(&installation.hooks_dir(), When::Post, "remove", &env, &changed_paths)?;

    Ok(())
}

fn hook_env(name: &str, target_root: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("PACKAGE".to_string(), name.to_string());
    env.insert("ROOT".to_string(), target_root.to_string_lossy().into_owned());
    env
}

fn ignore_not_found(err: std::io::Error) -> std::io::Result<()> {
    if err.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

fn load_manifest(path: &Path) -> Result<Manifest, Error> {
    let text = fs::read_to_string(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
    Ok(Manifest::parse(&text)?)
}

fn extract_to_staging(archive_path: &Path, compression: Compression, staging: &Path) -> Result<Manifest, Error> {
    fs::create_dir_all(staging).map_err(|e| Error::Io(staging.to_path_buf(), e))?;

    let mut reader = Reader::open(archive_path, compression)?;
    let mut entries = Vec::new();

    for entry in reader.entries()? {
        let mut entry = entry.map_err(|e| Error::Io(archive_path.to_path_buf(), e))?;
        let header = entry.header().clone();
        let rel_path = entry
            .path()
            .map_err(|e| Error::Io(archive_path.to_path_buf(), e))?
            .to_string_lossy()
            .into_owned();

        let kind = match header.entry_type() {
            tar::EntryType::Directory => EntryType::Directory,
            tar::EntryType::Symlink => EntryType::Symlink,
            _ => EntryType::Regular,
        };
        let mode = header.mode().unwrap_or(0o644);
        let uid = header.uid().unwrap_or(0) as u32;
        let gid = header.gid().unwrap_or(0) as u32;
        let size = header.size().unwrap_or(0);

        entry.unpack_in(staging).map_err(|e| Error::Io(staging.to_path_buf(), e))?;

        let hash = if kind == EntryType::Regular {
            Some(hash_file(&staging.join(&rel_path))?)
        } else {
            None
        };

        entries.push(Entry {
            mode,
            uid,
            gid,
            kind,
            size,
            hash,
            path: format!("/{rel_path}"),
        });
    }

    Ok(Manifest::new(entries))
}

/// Copies `new_manifest`'s entries from `staging` into `target_root`.
/// When `previous` is given, paths it lists that `new_manifest` doesn't
/// are removed afterwards, deepest first.
fn overlay(staging: &Path, target_root: &Path, new_manifest: &Manifest, previous: Option<&Manifest>) -> Result<(), Error> {
    for entry in new_manifest.entries() {
        let rel = entry.path.trim_start_matches('/');
        let dest = target_root.join(rel);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;
        }

        match entry.kind {
            EntryType::Directory => {
                fs::create_dir_all(&dest).map_err(|e| Error::Io(dest.clone(), e))?;
            }
            EntryType::Symlink => {
                let src = staging.join(rel);
                let target = fs::read_link(&src).map_err(|e| Error::Io(src.clone(), e))?;
                let _ = fs::remove_file(&dest);
                std::os::unix::fs::symlink(&target, &dest).map_err(|e| Error::Io(dest.clone(), e))?;
            }
            EntryType::Regular => {
                let src = staging.join(rel);
                move_or_copy(&src, &dest)?;
                set_mode(&dest, entry.mode)?;
            }
        }
    }

    if let Some(previous) = previous {
        let new_paths: BTreeSet<&str> = new_manifest.entries().iter().map(|e| e.path.as_str()).collect();
        let mut orphans: Vec<&Entry> = previous
            .entries()
            .iter()
            .filter(|entry| !new_paths.contains(entry.path.as_str()))
            .collect();
        orphans.sort_by(|a, b| b.path.cmp(&a.path));

        for entry in orphans {
            let rel = entry.path.trim_start_matches('/');
            let dest = target_root.join(rel);
            match entry.kind {
                EntryType::Directory => {
                    let _ = fs::remove_dir(&dest);
                }
                _ => {
                    let _ = fs::remove_file(&dest);
                }
            }
        }
    }

    Ok(())
}

fn move_or_copy(src: &Path, dest: &Path) -> Result<(), Error> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if err.raw_os_error() == Some(nix::libc::EXDEV) => {
            fs::copy(src, dest).map_err(|e| Error::Io(dest.to_path_buf(), e))?;
            fs::remove_file(src).map_err(|e| Error::Io(src.to_path_buf(), e))?;
            Ok(())
        }
        Err(err) => Err(Error::Io(dest.to_path_buf(), err)),
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| Error::Io(path.to_path_buf(), e))
}

fn hash_file(path: &Path) -> Result<String, Error> {
    let mut file = fs::File::open(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).map_err(|e| Error::Io(path.to_path_buf(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("lock")]
    Lock(#[from] LockError),
    #[error("malformed archive filename")]
    Filename(#[from] package::Error),
    #[error("archive read")]
    Read(#[from] archive::ReadError),
    #[error("malformed manifest")]
    Manifest(#[from] archive::manifest::Error),
    #[error("malformed EVR")]
    Evr(#[from] EvrParseError),
    #[error("installed record")]
    Record(#[from] record::Error),
    #[error("history log")]
    History(#[from] history::Error),
    #[error("rollback capture")]
    Rollback(#[from] rollback::Error),
    #[error("delta")]
    Delta(#[from] delta::Error),
    #[error("hook")]
    Hook(#[from] hooks::Error),
    #[error("package {0:?} is not installed")]
    NotInstalled(String),
    #[error("package {0:?} is still required by: {1:?}")]
    HasDependents(String, Vec<String>),
}

#[cfg(test)]
mod test {
    use archive::Writer;

    use super::*;

    fn build_archive(path: &Path, contents: &[(&str, &[u8])]) {
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
            dep_versions: BTreeMap::new(),
            environment_fingerprint: "env".into(),
            abi_fingerprint: "abi".into(),
            toolchain_fingerprint: "tool".into(),
            build_time: Utc::now(),
        }
    }

    #[test]
    fn installs_fresh_package() {
        let root = tempfile::tempdir().unwrap();
        let installation = Installation::open(root.path());

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("zlib-1.3-1.tar.zst");
        build_archive(&archive_path, &[("usr/lib/libz.so", b"payload")]);

        let record = install_pkg(&installation, new_package(archive_path)).unwrap();
        assert_eq!(record.name, "zlib");
        assert!(root.path().join("usr/lib/libz.so").exists());
        assert!(InstalledRecord::load(&installation.installed_dir(), "zlib").unwrap().is_some());
    }

    #[test]
    fn upgrade_removes_orphaned_files() {
        let root = tempfile::tempdir().unwrap();
        let installation = Installation::open(root.path());

        let archive_dir = tempfile::tempdir().unwrap();
        let v1 = archive_dir.path().join("zlib-1.3-1.tar.zst");
        build_archive(&v1, &[("usr/lib/old.so", b"old")]);
        install_pkg(&installation, new_package(v1)).unwrap();
        assert!(root.path().join("usr/lib/old.so").exists());

        let v2 = archive_dir.path().join("zlib-1.4-1.tar.zst");
        build_archive(&v2, &[("usr/lib/new.so", b"new")]);
        install_pkg(&installation, new_package(v2)).unwrap();

        assert!(!root.path().join("usr/lib/old.so").exists());
        assert!(root.path().join("usr/lib/new.so").exists());
    }

    #[test]
    fn uninstall_refuses_when_depended_on() {
        let root = tempfile::tempdir().unwrap();
        let installation = Installation::open(root.path());

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("zlib-1.3-1.tar.zst");
        build_archive(&archive_path, &[("usr/lib/libz.so", b"payload")]);
        install_pkg(&installation, new_package(archive_path)).unwrap();

        let mut dependent = InstalledRecord::load(&installation.installed_dir(), "zlib").unwrap().unwrap();
        dependent.name = "libpng".to_string();
        dependent.deps = vec!["zlib".to_string()];
        dependent.save(&installation.installed_dir()).unwrap();

        let err = uninstall(&installation, "zlib", false).unwrap_err();
        assert!(matches!(err, Error::HasDependents(_, _)));

        uninstall(&installation, "zlib", true).unwrap();
        assert!(!root.path().join("usr/lib/libz.so").exists());
    }
}
