// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Line-based file manifest: one line per installed path,
//! `<mode-octal> <uid> <gid> <type> <size> <sha256|-> <path>`, sorted
//! by path for a deterministic, diffable record.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryType {
    Regular,
    Directory,
    Symlink,
}

impl EntryType {
    fn as_char(self) -> char {
        match self {
            EntryType::Regular => 'f',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(EntryType::Regular),
            'd' => Some(EntryType::Directory),
            'l' => Some(EntryType::Symlink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub kind: EntryType,
    pub size: u64,
    /// Absent for directories and symlinks, present for regular files.
    pub hash: Option<String>,
    pub path: String,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:o} {} {} {} {} {} {}",
            self.mode,
            self.uid,
            self.gid,
            self.kind.as_char(),
            self.size,
            self.hash.as_deref().unwrap_or("-"),
            self.path
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed manifest line {0:?}")]
    Syntax(String),
}

/// A manifest: entries kept in path-sorted order so two manifests can
/// be walked in lockstep when computing a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest(Vec<Entry>);

impl Manifest {
    pub fn new(mut entries: Vec<Entry>) -> Self {
        entries.sort();
        Self(entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.0
    }

    pub fn render(&self) -> String {
        self.0.iter().map(|entry| format!("{entry}\n")).collect()
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut entries = Vec::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            entries.push(parse_line(line)?);
        }

        Ok(Self::new(entries))
    }
}

fn parse_line(line: &str) -> Result<Entry, Error> {
    let mut fields = line.splitn(7, ' ');
    let err = || Error::Syntax(line.to_string());

    let mode = u32::from_str_radix(fields.next().ok_or_else(err)?, 8).map_err(|_| err())?;
    let uid = fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let gid = fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let kind = EntryType::from_char(fields.next().ok_or_else(err)?.chars().next().ok_or_else(err)?).ok_or_else(err)?;
    let size = fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let hash = match fields.next().ok_or_else(err)? {
        "-" => None,
        other => Some(other.to_string()),
    };
    let path = fields.next().ok_or_else(err)?.to_string();

    Ok(Entry {
        mode,
        uid,
        gid,
        kind,
        size,
        hash,
        path,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrips_through_text() {
        let manifest = Manifest::new(vec![
            Entry {
                mode: 0o755,
                uid: 0,
                gid: 0,
                kind: EntryType::Regular,
                size: 1024,
                hash: Some("abc123".into()),
                path: "/usr/bin/zlib".into(),
            },
            Entry {
                mode: 0o755,
                uid: 0,
                gid: 0,
                kind: EntryType::Directory,
                size: 0,
                hash: None,
                path: "/usr/bin".into(),
            },
        ]);

        let rendered = manifest.render();
        let parsed = Manifest::parse(&rendered).unwrap();

        assert_eq!(parsed.entries(), manifest.entries());
    }

    #[test]
    fn sorts_entries_by_path() {
        let manifest = Manifest::new(vec![
            Entry {
                mode: 0o644,
                uid: 0,
                gid: 0,
                kind: EntryType::Regular,
                size: 0,
                hash: None,
                path: "/usr/z".into(),
            },
            Entry {
                mode: 0o644,
                uid: 0,
                gid: 0,
                kind: EntryType::Regular,
                size: 0,
                hash: None,
                path: "/usr/a".into(),
            },
        ]);

        assert_eq!(manifest.entries()[0].path, "/usr/a");
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(Manifest::parse("not a manifest line\n").is_err());
    }
}
