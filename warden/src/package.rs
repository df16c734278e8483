// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Package archive filenames and the metadata summary line used by the
//! `list`/`info` CLI surfaces.

use std::path::Path;

use archive::Compression;
use thiserror::Error;

/// `(name, version, release)` decoded from an archive filename of the
/// form `<name>-<version>-<release>.tar.<zst|xz|...>`. Parsers tokenize
/// from the right: the last two `-`-separated fields are release and
/// version, everything before them is the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filename {
    pub name: String,
    pub version: String,
    pub release: u64,
    pub compression: Compression,
}

impl Filename {
    pub fn parse(path: &Path) -> Result<Self, Error> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Malformed(path.to_path_buf()))?;

        let compression =
            Compression::from_extension(file_name).ok_or_else(|| Error::UnknownCompression(path.to_path_buf()))?;

        let stem = strip_archive_extension(file_name).ok_or_else(|| Error::Malformed(path.to_path_buf()))?;

        let mut parts = stem.rsplitn(3, '-');
        let release_str = parts.next().ok_or_else(|| Error::Malformed(path.to_path_buf()))?;
        let version = parts
            .next()
            .ok_or_else(|| Error::Malformed(path.to_path_buf()))?
            .to_string();
        let name = parts
            .next()
            .ok_or_else(|| Error::Malformed(path.to_path_buf()))?
            .to_string();

        let release = release_str
            .parse()
            .map_err(|_| Error::Malformed(path.to_path_buf()))?;

        Ok(Filename {
            name,
            version,
            release,
            compression,
        })
    }

    pub fn to_file_name(&self) -> String {
        let ext = match self.compression {
            Compression::Zstd => "tar.zst",
            Compression::Gzip => "tar.gz",
            Compression::Xz => "tar.xz",
            Compression::Bzip2 => "tar.bz2",
        };
        format!("{}-{}-{}.{ext}", self.name, self.version, self.release)
    }
}

fn strip_archive_extension(file_name: &str) -> Option<&str> {
    for ext in [".tar.zst", ".tzst", ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2"] {
        if let Some(stem) = file_name.strip_suffix(ext) {
            return Some(stem);
        }
    }
    None
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed package archive filename: {0:?}")]
    Malformed(std::path::PathBuf),
    #[error("unrecognized compression extension: {0:?}")]
    UnknownCompression(std::path::PathBuf),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_name_version_release_from_the_right() {
        let parsed = Filename::parse(Path::new("bash-completion-2.11-1.tar.zst")).unwrap();
        assert_eq!(parsed.name, "bash-completion");
        assert_eq!(parsed.version, "2.11");
        assert_eq!(parsed.release, 1);
        assert_eq!(parsed.compression, Compression::Zstd);
    }

    #[test]
    fn round_trips_back_to_a_filename() {
        let parsed = Filename::parse(Path::new("zlib-1.3-2.tar.xz")).unwrap();
        assert_eq!(parsed.to_file_name(), "zlib-1.3-2.tar.xz");
    }

    #[test]
    fn rejects_unknown_compression() {
        assert!(Filename::parse(Path::new("zlib-1.3-2.zip")).is_err());
    }
}
