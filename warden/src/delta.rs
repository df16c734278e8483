// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Four-section manifest diff, written under the deltas directory keyed
//! by `<name>/<EVR_old>__to__<EVR_new>.delta`.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use archive::Manifest;
use fs_err as fs;
use thiserror::Error;

use crate::evr::Evr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changed {
    pub path: String,
    pub old_hash: String,
    pub new_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<Changed>,
    pub unchanged: Vec<String>,
}

impl Delta {
    /// Joins `old` and `new` on path: entries present only in `new` are
    /// `added`, present only in `old` are `removed`, present in both with
    /// differing hashes are `changed`, the rest `unchanged`.
    pub fn compute(old: &Manifest, new: &Manifest) -> Self {
        let old_by_path: BTreeMap<&str, &archive::Entry> =
            old.entries().iter().map(|e| (e.path.as_str(), e)).collect();
        let new_by_path: BTreeMap<&str, &archive::Entry> =
            new.entries().iter().map(|e| (e.path.as_str(), e)).collect();

        let mut delta = Delta::default();

        for (path, new_entry) in &new_by_path {
            match old_by_path.get(path) {
                None => delta.added.push(path.to_string()),
                Some(old_entry) => {
                    let old_hash = old_entry.hash.clone().unwrap_or_default();
                    let new_hash = new_entry.hash.clone().unwrap_or_default();
                    if old_hash == new_hash {
                        delta.unchanged.push(path.to_string());
                    } else {
                        delta.changed.push(Changed {
                            path: path.to_string(),
                            old_hash,
                            new_hash,
                        });
                    }
                }
            }
        }

        for path in old_by_path.keys() {
            if !new_by_path.contains_key(path) {
                delta.removed.push(path.to_string());
            }
        }

        delta.added.sort();
        delta.removed.sort();
        delta.changed.sort_by(|a, b| a.path.cmp(&b.path));
        delta.unchanged.sort();

        delta
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in &self.added {
            out.push_str(&format!("+ {path}\n"));
        }
        for path in &self.removed {
            out.push_str(&format!("- {path}\n"));
        }
        for changed in &self.changed {
            out.push_str(&format!("~ {} {} -> {}\n", changed.path, changed.old_hash, changed.new_hash));
        }
        for path in &self.unchanged {
            out.push_str(&format!("= {path}\n"));
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut delta = Delta::default();
        for line in text.lines() {
            let Some((marker, rest)) = line.split_once(' ') else {
                return Err(Error::Syntax(line.to_string()));
            };
            match marker {
                "+" => delta.added.push(rest.to_string()),
                "-" => delta.removed.push(rest.to_string()),
                "=" => delta.unchanged.push(rest.to_string()),
                "~" => {
                    let mut fields = rest.split(' ');
                    let path = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;
                    let old_hash = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;
                    let arrow = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;
                    let new_hash = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;
                    if arrow != "->" {
                        return Err(Error::Syntax(line.to_string()));
                    }
                    delta.changed.push(Changed {
                        path: path.to_string(),
                        old_hash: old_hash.to_string(),
                        new_hash: new_hash.to_string(),
                    });
                }
                _ => return Err(Error::Syntax(line.to_string())),
            }
        }
        Ok(delta)
    }
}

pub fn path_for(dir: &Path, name: &str, old_evr: &Evr, new_evr: &Evr) -> PathBuf {
    dir.join(name).join(format!("{old_evr}__to__{new_evr}.delta"))
}

pub fn write(dir: &Path, name: &str, old_evr: &Evr, new_evr: &Evr, delta: &Delta) -> Result<(), Error> {
    let path = path_for(dir, name, old_evr, new_evr);
    let parent = path.parent().expect("delta path always has a parent");
    fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;

    let tmp = path.with_extension("delta.tmp");
    fs::write(&tmp, delta.render()).map_err(|e| Error::Io(tmp.clone(), e))?;
    fs::rename(&tmp, &path).map_err(|e| Error::Io(path, e))
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("malformed delta line: {0:?}")]
    Syntax(String),
}

#[cfg(test)]
mod test {
    use archive::{Entry, EntryType};

    use super::*;

    fn entry(path: &str, hash: &str) -> Entry {
        Entry {
            mode: 0o644,
            uid: 0,
            gid: 0,
            kind: EntryType::Regular,
            size: 4,
            hash: Some(hash.to_string()),
            path: path.to_string(),
        }
    }

    #[test]
    fn computes_all_four_sections() {
        let old = Manifest::new(vec![entry("/a", "1"), entry("/b", "2"), entry("/c", "3")]);
        let new = Manifest::new(vec![entry("/a", "1"), entry("/b", "9"), entry("/d", "4")]);

        let delta = Delta::compute(&old, &new);
        assert_eq!(delta.added, vec!["/d".to_string()]);
        assert_eq!(delta.removed, vec!["/c".to_string()]);
        assert_eq!(delta.unchanged, vec!["/a".to_string()]);
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.changed[0].path, "/b");
        assert_eq!(delta.changed[0].old_hash, "2");
        assert_eq!(delta.changed[0].new_hash, "9");
    }

    #[test]
    fn render_roundtrips_through_parse() {
        let old = Manifest::new(vec![entry("/a", "1")]);
        let new = Manifest::new(vec![entry("/a", "2")]);
        let delta = Delta::compute(&old, &new);

        let parsed = Delta::parse(&delta.render()).unwrap();
        assert_eq!(parsed, delta);
    }
}
