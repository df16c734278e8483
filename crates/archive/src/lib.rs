// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

pub mod manifest;
mod read;
mod write;

pub use self::manifest::{Entry, EntryType, Manifest};
pub use self::read::{Error as ReadError, Reader};
pub use self::write::{Error as WriteError, Writer};

/// Compressors a package archive payload may be stored under. `Zstd`
/// is the default for newly-built archives; the others exist so
/// upstream source tarballs using them can be unpacked with the same
/// reader machinery during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zstd,
    Gzip,
    Xz,
    Bzip2,
}

impl Compression {
    /// Guesses the compressor from a source tarball's file extension.
    pub fn from_extension(name: &str) -> Option<Self> {
        if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Compression::Zstd)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Compression::Bzip2)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn guesses_compression_from_extension() {
        assert_eq!(Compression::from_extension("zlib-1.3.tar.gz"), Some(Compression::Gzip));
        assert_eq!(Compression::from_extension("zlib-1.3.tar.xz"), Some(Compression::Xz));
        assert_eq!(Compression::from_extension("zlib-1.3.tar.bz2"), Some(Compression::Bzip2));
        assert_eq!(Compression::from_extension("zlib-1.3.tar.zst"), Some(Compression::Zstd));
        assert_eq!(Compression::from_extension("zlib-1.3.zip"), None);
    }

    #[test]
    fn writes_and_reads_back_a_package_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("zlib.pkg");

        let mut writer = Writer::create(&archive_path, Compression::Zstd).unwrap();
        writer.add_directory("usr/lib", 0o755).unwrap();
        writer
            .add_file("usr/lib/libz.so.1", &mut "not really a shared object".as_bytes(), 0o755)
            .unwrap();
        let digest = writer.finish().unwrap();
        assert_eq!(digest.len(), 64);

        let mut reader = Reader::open(&archive_path, Compression::Zstd).unwrap();
        let paths = reader
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        assert_eq!(paths, vec!["usr/lib", "usr/lib/libz.so.1"]);
    }
}
