// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Captures and restores rollback bundles: before an overlay replaces an
//! existing installation of `name@EVR_old`, the exact set of files and
//! symlinks the old manifest lists is tarred up alongside a copy of that
//! manifest, so a rollback is possible even if the old package archive
//! was garbage-collected.

use std::{
    io,
    path::{Path, PathBuf},
};

use archive::{Compression, Manifest, Reader, Writer};
use fs_err as fs;
use thiserror::Error;

use crate::evr::Evr;

fn bundle_dir(rollback_dir: &Path, name: &str, evr: &Evr) -> PathBuf {
    rollback_dir.join(name).join(evr.to_string())
}

fn bundle_path(dir: &Path, compression: Compression) -> PathBuf {
    let ext = match compression {
        Compression::Zstd => "tar.zst",
        Compression::Gzip => "tar.gz",
        Compression::Xz => "tar.xz",
        Compression::Bzip2 => "tar.bz2",
    };
    dir.join(format!("bundle.{ext}"))
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("manifest.old")
}

/// Reads every regular file and symlink the manifest records, relative to
/// `target_root`, into a fresh bundle archive; also copies the manifest
/// itself alongside it.
pub fn capture(
    rollback_dir: &Path,
    name: &str,
    evr: &Evr,
    target_root: &Path,
    manifest: &Manifest,
    compression: Compression,
) -> Result<(), Error> {
    let dir = bundle_dir(rollback_dir, name, evr);
    fs::create_dir_all(&dir).map_err(|e| Error::Io(dir.clone(), e))?;

    let tmp_bundle = dir.join("bundle.tmp");
    {
        let mut writer = Writer::create(&tmp_bundle, compression)?;

        for entry in manifest.entries() {
            let archive_path = entry.path.trim_start_matches('/');
            let host_path = target_root.join(archive_path);

            match entry.kind {
                archive::EntryType::Directory => writer.add_directory(archive_path, entry.mode)?,
                archive::EntryType::Symlink => {
                    let target = fs::read_link(&host_path).map_err(|e| Error::Io(host_path.clone(), e))?;
                    writer.add_symlink(archive_path, &target.to_string_lossy())?;
                }
                archive::EntryType::Regular => {
                    let mut file = fs::File::open(&host_path).map_err(|e| Error::Io(host_path.clone(), e))?;
                    writer.add_file(archive_path, &mut file, entry.mode)?;
                }
            }
        }

        writer.finish()?;
    }

    let final_bundle = bundle_path(&dir, compression);
    fs::rename(&tmp_bundle, &final_bundle).map_err(|e| Error::Io(final_bundle, e))?;

    let tmp_manifest = dir.join("manifest.old.tmp");
    fs::write(&tmp_manifest, manifest.render()).map_err(|e| Error::Io(tmp_manifest.clone(), e))?;
    fs::rename(&tmp_manifest, manifest_path(&dir)).map_err(|e| Error::Io(manifest_path(&dir), e))?;

    Ok(())
}

/// Restores a previously captured bundle directly into `target_root`,
/// returning the preserved manifest so the caller can rebuild a minimal
/// [`InstalledRecord`](crate::record::InstalledRecord).
pub fn restore(
    rollback_dir: &Path,
    name: &str,
    evr: &Evr,
    target_root: &Path,
    compression: Compression,
) -> Result<Manifest, Error> {
    let dir = bundle_dir(rollback_dir, name, evr);
    let bundle = bundle_path(&dir, compression);

    let manifest_text = fs::read_to_string(manifest_path(&dir)).map_err(|e| Error::Io(manifest_path(&dir), e))?;
    let manifest = Manifest::parse(&manifest_text)?;

    let mut reader = Reader::open(&bundle, compression)?;
    for entry in reader.entries()? {
        let mut entry = entry.map_err(|e| Error::Io(target_root.to_path_buf(), e))?;
        entry
            .unpack_in(target_root)
            .map_err(|e| Error::Io(target_root.to_path_buf(), e))?;
    }

    Ok(manifest)
}

pub fn exists(rollback_dir: &Path, name: &str, evr: &Evr) -> bool {
    bundle_dir(rollback_dir, name, evr).join("manifest.old").is_file()
}

/// Recovers which [`Compression`] a captured bundle used, since a caller
/// restoring it after the original archive was garbage-collected has no
/// other way to know which `bundle.<ext>` to look for.
pub fn bundle_compression(rollback_dir: &Path, name: &str, evr: &Evr) -> Option<Compression> {
    let dir = bundle_dir(rollback_dir, name, evr);
    for entry in fs::read_dir(&dir).ok()?.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let Some(ext) = file_name.to_str().and_then(|n| n.strip_prefix("bundle.")) else {
            continue;
        };
        return match ext {
            "tar.zst" => Some(Compression::Zstd),
            "tar.gz" => Some(Compression::Gzip),
            "tar.xz" => Some(Compression::Xz),
            "tar.bz2" => Some(Compression::Bzip2),
            _ => None,
        };
    }
    None
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] io::Error),
    #[error("archive write")]
    Write(#[from] archive::WriteError),
    #[error("archive read")]
    Read(#[from] archive::ReadError),
    #[error("malformed preserved manifest")]
    Manifest(#[from] archive::manifest::Error),
}

#[cfg(test)]
mod test {
    use archive::{Entry, EntryType};

    use super::*;

    fn write_file(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn captures_and_restores_a_bundle() {
        let target = tempfile::tempdir().unwrap();
        write_file(target.path(), "usr/bin/tool", b"binary");

        let manifest = Manifest::new(vec![Entry {
            mode: 0o755,
            uid: 0,
            gid: 0,
            kind: EntryType::Regular,
            size: 6,
            hash: Some("deadbeef".into()),
            path: "/usr/bin/tool".into(),
        }]);

        let rollback_dir = tempfile::tempdir().unwrap();
        capture(
            rollback_dir.path(),
            "tool",
            &Evr::new(0, "1.0", 1),
            target.path(),
            &manifest,
            Compression::Zstd,
        )
        .unwrap();

        assert!(exists(rollback_dir.path(), "tool", &Evr::new(0, "1.0", 1)));

        let restore_target = tempfile::tempdir().unwrap();
        let restored = restore(
            rollback_dir.path(),
            "tool",
            &Evr::new(0, "1.0", 1),
            restore_target.path(),
            Compression::Zstd,
        )
        .unwrap();

        assert_eq!(restored, manifest);
        assert_eq!(
            fs::read(restore_target.path().join("usr/bin/tool")).unwrap(),
            b"binary"
        );
    }
}
