// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Turns a populated `DESTDIR` into a package archive: strip
//! ELF binaries, walk the tree into a manifest in lexical order, tar
//! and compress it with reproducibility flags, then atomically place
//! the archive, manifest and a "built-but-not-installed" record.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    process::Command,
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{env::Env, recipe::Recipe, util};

/// Paths produced by a successful [`package`] call.
pub struct Output {
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub record_path: PathBuf,
}

/// A recorded package that has been built but not yet installed —
/// distinct from `warden::record::InstalledRecord`, which only exists
/// once a package has actually been overlaid onto a target root.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuiltRecord {
    pub name: String,
    pub version: String,
    pub release: u64,
    pub deps: Vec<String>,
    pub build_time: DateTime<Utc>,
    pub toolchain_fingerprint: String,
    pub environment_fingerprint: String,
    pub abi_fingerprint: String,
}

/// Directories bin/lib binaries are stripped in; anything outside
/// these is left untouched even if it happens to be an ELF file.
const STRIPPABLE_DIRS: &[&str] = &["bin", "sbin", "lib", "lib64", "libexec"];

pub fn package(recipe: &Recipe, env: &Env, staging_root: &Path, out_dir: &Path) -> Result<Output, Error> {
    util::ensure_dir_exists(out_dir)?;

    if recipe.parsed.options.strip {
        strip_elf_binaries(staging_root, recipe)?;
    }

    let manifest = build_manifest(staging_root)?;

    let nvr = recipe.nvr();
    let archive_tmp = out_dir.join(format!(".{nvr}.pkg.tmp"));
    let archive_path = out_dir.join(format!("{nvr}.pkg.zst"));
    let mut writer = archive::Writer::create(&archive_tmp, archive::Compression::Zstd)?;

    for entry in manifest.entries() {
        add_entry(&mut writer, staging_root, entry)?;
    }
    writer.finish()?;
    fs::rename(&archive_tmp, &archive_path)?;

    let manifest_tmp = out_dir.join(format!(".{nvr}.manifest.tmp"));
    let manifest_path = out_dir.join(format!("{nvr}.manifest"));
    fs::write(&manifest_tmp, manifest.render())?;
    fs::rename(&manifest_tmp, &manifest_path)?;

    let mut env_vars = BTreeMap::new();
    env_vars.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());

    let record = BuiltRecord {
        name: recipe.parsed.source.name.clone(),
        version: recipe.parsed.source.version.clone(),
        release: recipe.parsed.source.release,
        deps: recipe.deps().to_vec(),
        build_time: recipe.build_time,
        toolchain_fingerprint: warden::fingerprint::toolchain(),
        environment_fingerprint: warden::fingerprint::environment(&env_vars),
        abi_fingerprint: warden::fingerprint::abi(staging_root).map_err(Error::Fingerprint)?,
    };

    let record_tmp = env.cache_dir.join("built").join(format!(".{nvr}.built.meta.tmp"));
    let record_path = env.cache_dir.join("built").join(format!("{nvr}.built.meta"));
    util::ensure_dir_exists(record_path.parent().expect("has parent"))?;
    fs::write(&record_tmp, serde_json::to_string_pretty(&record)?)?;
    fs::rename(&record_tmp, &record_path)?;

    Ok(Output {
        archive_path,
        manifest_path,
        record_path,
    })
}

fn add_entry(writer: &mut archive::Writer, staging_root: &Path, entry: &archive::Entry) -> Result<(), Error> {
    let full_path = staging_root.join(&entry.path);

    match entry.kind {
        archive::EntryType::Directory => {
            writer.add_directory(&entry.path, entry.mode)?;
        }
        archive::EntryType::Symlink => {
            let target = fs::read_link(&full_path)?;
            writer.add_symlink(&entry.path, &target.to_string_lossy())?;
        }
        archive::EntryType::Regular => {
            let mut file = fs::File::open(&full_path)?;
            writer.add_file(&entry.path, &mut file, entry.mode)?;
        }
    }

    Ok(())
}

/// Walks `staging_root` in lexical path order and records mode,
/// ownership, type, size and (for regular files) sha256 hash of every
/// entry, so the manifest is reproducible across rebuilds.
fn build_manifest(staging_root: &Path) -> Result<archive::Manifest, Error> {
    let mut entries = Vec::new();
    walk(staging_root, staging_root, &mut entries)?;
    Ok(archive::Manifest::new(entries))
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<archive::Entry>) -> Result<(), Error> {
    use std::os::unix::fs::MetadataExt;

    let mut children = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = child.path();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
        let metadata = fs::symlink_metadata(&path)?;

        let kind = if metadata.is_symlink() {
            archive::EntryType::Symlink
        } else if metadata.is_dir() {
            archive::EntryType::Directory
        } else {
            archive::EntryType::Regular
        };

        let hash = if kind == archive::EntryType::Regular {
            Some(hash_file(&path)?)
        } else {
            None
        };

        out.push(archive::Entry {
            mode: metadata.mode() & 0o7777,
            uid: 0,
            gid: 0,
            kind,
            size: metadata.size(),
            hash,
            path: relative,
        });

        if metadata.is_dir() && !metadata.is_symlink() {
            walk(root, &path, out)?;
        }
    }

    Ok(())
}

fn hash_file(path: &Path) -> Result<String, Error> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Strips debug symbols from ELF binaries under the recognized
/// bin/lib directories. Setuid files are left alone: stripping can
/// change their measured size/hash in ways that matter for a setuid
/// binary's security review, so we warn and skip instead.
fn strip_elf_binaries(staging_root: &Path, recipe: &Recipe) -> Result<(), Error> {
    let use_llvm = matches!(recipe.parsed.options.toolchain, recipe::Toolchain::Llvm);
    let strip = if use_llvm { "llvm-strip" } else { "strip" };

    for dir_name in STRIPPABLE_DIRS {
        let dir = staging_root.join(dir_name);
        if !dir.exists() {
            continue;
        }

        for path in util::enumerate_files(&dir, |_| true)? {
            let metadata = fs::symlink_metadata(&path)?;
            if metadata.is_symlink() {
                continue;
            }

            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o4000 != 0 {
                eprintln!("skipping strip of setuid file {}", path.display());
                continue;
            }

            if !looks_like_elf(&path)? {
                continue;
            }

            let output = Command::new(strip).args(["-g", "--strip-unneeded"]).arg(&path).output()?;
            if !output.status.success() {
                eprintln!(
                    "strip failed for {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr)
                );
            }
        }
    }

    Ok(())
}

fn looks_like_elf(path: &Path) -> Result<bool, Error> {
    use std::io::Read;

    let mut magic = [0u8; 4];
    let mut file = fs::File::open(path)?;
    if file.read(&mut magic)? < 4 {
        return Ok(false);
    }
    Ok(magic == *b"\x7fELF")
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("archive write")]
    Write(#[from] archive::WriteError),
    #[error("archive manifest")]
    Manifest(#[from] archive::manifest::Error),
    #[error("fingerprint")]
    Fingerprint(#[source] warden::fingerprint::Error),
    #[error("serialize built record")]
    Json(#[from] serde_json::Error),
}
