// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Toolchain, environment and ABI fingerprints used by the rebuild
//! planner: each is a SHA-256 of a canonical textual dump, so two
//! fingerprints are comparable as plain strings.

use std::{collections::BTreeMap, path::Path, process::Command};

use elf::{abi::{DT_NEEDED, DT_SONAME}, endian::AnyEndian, ElfStream};
use fs_err as fs;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Environment variables that influence build output and therefore
/// participate in the environment fingerprint.
pub const PINNED_ENV_VARS: &[&str] = &[
    "CFLAGS",
    "CXXFLAGS",
    "CPPFLAGS",
    "LDFLAGS",
    "PATH",
    "PKG_CONFIG_PATH",
    "C_INCLUDE_PATH",
    "CPLUS_INCLUDE_PATH",
    "LIBRARY_PATH",
];

/// The tools whose version probe output composes the toolchain
/// fingerprint, paired with the flag used to print a version string.
const TOOLCHAIN_PROBES: &[(&str, &str)] = &[
    ("cc", "--version"),
    ("ld", "--version"),
    ("as", "--version"),
    ("ar", "--version"),
    ("ranlib", "--version"),
    ("ld.so", "--version"),
];

fn digest_lines(lines: impl IntoIterator<Item = String>) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Hashes the pinned subset of `env`, sorted by key so the fingerprint is
/// order-independent.
pub fn environment(env: &BTreeMap<String, String>) -> String {
    let lines = PINNED_ENV_VARS.iter().map(|key| {
        let value = env.get(*key).map(String::as_str).unwrap_or("");
        format!("{key}={value}")
    });
    digest_lines(lines)
}

/// Runs each toolchain tool's version probe and hashes the results.
/// A tool that fails to spawn or exits non-zero contributes the literal
/// sentinel `<tool>?` rather than aborting fingerprint computation.
pub fn toolchain() -> String {
    let lines = TOOLCHAIN_PROBES.iter().map(|(tool, flag)| {
        let output = Command::new(tool).arg(flag).output();
        match output {
            Ok(out) if out.status.success() => {
                let first_line = String::from_utf8_lossy(&out.stdout).lines().next().unwrap_or("").trim().to_string();
                format!("{tool}={first_line}")
            }
            _ => format!("{tool}=<{tool}?>"),
        }
    });
    digest_lines(lines)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("read directory {0:?}")]
    ReadDir(std::path::PathBuf, #[source] std::io::Error),
}

/// Walks every regular file under `root`, and for each one that parses as
/// an ELF file, records its SONAME (if any) and NEEDED entries. The
/// concatenation, in stable (path-sorted) order, is hashed to produce the
/// ABI fingerprint.
pub fn abi(root: &Path) -> Result<String, Error> {
    let mut entries = Vec::new();
    collect_elf_entries(root, root, &mut entries)?;
    entries.sort();
    Ok(digest_lines(entries))
}

fn collect_elf_entries(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), Error> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::ReadDir(dir.to_path_buf(), err)),
    };

    for entry in read_dir {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let file_type = entry.file_type();

        match file_type {
            Ok(ft) if ft.is_dir() => collect_elf_entries(root, &path, out)?,
            Ok(ft) if ft.is_file() => {
                if let Some(line) = elf_abi_line(root, &path) {
                    out.push(line);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn elf_abi_line(root: &Path, path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut stream = ElfStream::<AnyEndian, _>::open_stream(file).ok()?;

    let mut soname = None;
    let mut needed = Vec::new();

    let dynamic_entries = stream.dynamic().ok()??.iter().collect::<Vec<_>>();
    let (_, strtab) = stream.dynamic_symbol_table().ok()??;

    for entry in dynamic_entries {
        match entry.d_tag {
            DT_SONAME => {
                soname = strtab.get(entry.d_val() as usize).ok().map(str::to_string);
            }
            DT_NEEDED => {
                if let Ok(name) = strtab.get(entry.d_val() as usize) {
                    needed.push(name.to_string());
                }
            }
            _ => {}
        }
    }

    if soname.is_none() && needed.is_empty() {
        return None;
    }

    needed.sort();
    let relative = path.strip_prefix(root).unwrap_or(path);
    Some(format!(
        "{} soname={} needed={}",
        relative.display(),
        soname.as_deref().unwrap_or("-"),
        needed.join(",")
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn environment_fingerprint_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("CFLAGS".to_string(), "-O2".to_string());
        a.insert("PATH".to_string(), "/usr/bin".to_string());

        let mut b = BTreeMap::new();
        b.insert("PATH".to_string(), "/usr/bin".to_string());
        b.insert("CFLAGS".to_string(), "-O2".to_string());

        assert_eq!(environment(&a), environment(&b));
    }

    #[test]
    fn environment_fingerprint_changes_with_value() {
        let mut a = BTreeMap::new();
        a.insert("CFLAGS".to_string(), "-O2".to_string());
        let mut b = BTreeMap::new();
        b.insert("CFLAGS".to_string(), "-O3".to_string());

        assert_ne!(environment(&a), environment(&b));
    }

    #[test]
    fn abi_fingerprint_of_empty_dir_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let a = abi(dir.path()).unwrap();
        let b = abi(dir.path()).unwrap();
        assert_eq!(a, b);
    }
}
