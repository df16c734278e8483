// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Unpacks a fetched source archive into a working tree and applies
//! patches on top of it.

use std::{
    io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use fs_err as fs;
use thiserror::Error;

use crate::util;

/// Extracts `archive` into `dest`, dispatching on its file extension.
/// If the archive unpacks to a single top-level directory, that
/// directory is promoted to be `dest` itself so callers always see a
/// flat source root regardless of how the upstream tarball nested it.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), Error> {
    util::recreate_dir(dest)?;

    let name = archive.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive, dest)?;
    } else if let Some(compression) = archive::Compression::from_extension(name) {
        extract_tar(archive, dest, compression)?;
    } else {
        return Err(Error::UnsupportedFormat(name.to_string()));
    }

    promote_single_top_level_dir(dest)?;

    Ok(())
}

fn extract_tar(archive: &Path, dest: &Path, compression: archive::Compression) -> Result<(), Error> {
    let mut reader = archive::Reader::open(archive, compression)?;

    for entry in reader.entries()? {
        let mut entry = entry.map_err(Error::TarEntry)?;
        entry.unpack_in(dest).map_err(Error::TarEntry)?;
    }

    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), Error> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let is_symlink = entry.unix_mode().is_some_and(|mode| mode & 0o170000 == 0o120000);
        if is_symlink {
            let mut target = String::new();
            io::Read::read_to_string(&mut entry, &mut target)?;
            let _ = symlink(&target, &out_path);
            continue;
        }

        let mut out_file = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// If `dest` contains exactly one entry and it is a directory, its
/// contents become `dest`'s own contents.
fn promote_single_top_level_dir(dest: &Path) -> io::Result<()> {
    let entries = fs::read_dir(dest)?.collect::<Result<Vec<_>, _>>()?;

    let [only] = entries.as_slice() else {
        return Ok(());
    };

    if !only.file_type()?.is_dir() {
        return Ok(());
    }

    let top_level = only.path();
    let dest_name = dest.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let staging = dest
        .parent()
        .map(|p| p.join(format!("{dest_name}.promote-tmp")))
        .unwrap_or_else(|| PathBuf::from(format!("{dest_name}.promote-tmp")));

    fs::rename(&top_level, &staging)?;
    for entry in fs::read_dir(&staging)?.flatten() {
        let target = dest.join(entry.file_name());
        fs::rename(entry.path(), target)?;
    }
    fs::remove_dir(&staging)?;

    Ok(())
}

/// Applies `patches`, in order, to `src_root` with strip-prefix 1.
/// Aborts on the first failure, leaving already-applied patches and
/// the working tree exactly as they are for diagnosis.
pub fn apply_patches(src_root: &Path, patches: &[PathBuf]) -> Result<(), Error> {
    for (index, patch) in patches.iter().enumerate() {
        let output = std::process::Command::new("patch")
            .args(["-p1", "--batch", "-i"])
            .arg(patch)
            .current_dir(src_root)
            .output()
            .map_err(|e| Error::PatchFailed(index, e.to_string()))?;

        if !output.status.success() {
            return Err(Error::PatchFailed(index, String::from_utf8_lossy(&output.stderr).into_owned()));
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("io")]
    Io(#[from] io::Error),
    #[error("open archive")]
    Read(#[from] archive::ReadError),
    #[error("unpack archive entry")]
    TarEntry(#[source] io::Error),
    #[error("open zip archive")]
    Zip(#[from] zip::result::ZipError),
    #[error("apply patch {0}: {1}")]
    PatchFailed(usize, String),
}
