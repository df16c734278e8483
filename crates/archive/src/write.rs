// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, Write},
    path::Path,
};

use fs_err::File;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::Compression;

#[derive(Debug, Error)]
pub enum Error {
    #[error("open archive {0:?}")]
    Open(std::path::PathBuf, #[source] io::Error),
    #[error("write archive entry {0:?}")]
    Append(String, #[source] io::Error),
    #[error("finalize archive")]
    Finish(#[source] io::Error),
}

/// Tracks the SHA-256 of everything written, so the caller can record
/// the finished archive's digest without a second read pass.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Encoder<W: Write> {
    Zstd(Box<zstd::Encoder<'static, W>>),
    Gzip(flate2::write::GzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Zstd(e) => e.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Xz(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Zstd(e) => e.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Xz(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
        }
    }
}

impl<W: Write> Encoder<W> {
    fn new(inner: W, compression: Compression) -> io::Result<Self> {
        Ok(match compression {
            Compression::Zstd => Encoder::Zstd(Box::new(zstd::Encoder::new(inner, 19)?)),
            Compression::Gzip => Encoder::Gzip(flate2::write::GzEncoder::new(inner, flate2::Compression::best())),
            Compression::Xz => Encoder::Xz(xz2::write::XzEncoder::new(inner, 9)),
            Compression::Bzip2 => Encoder::Bzip2(bzip2::write::BzEncoder::new(inner, bzip2::Compression::best())),
        })
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Zstd(e) => e.finish(),
            Encoder::Gzip(e) => e.finish(),
            Encoder::Xz(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
        }
    }
}

/// Builds a compressed tar archive, recording a SHA-256 over the
/// compressed bytes as they're written so the caller can record it in
/// the installed-record database without re-reading the file.
pub struct Writer {
    builder: tar::Builder<Encoder<DigestWriter<File>>>,
}

impl Writer {
    pub fn create(path: impl AsRef<Path>, compression: Compression) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::Open(path.to_path_buf(), e))?;
        let digested = DigestWriter {
            inner: file,
            hasher: Sha256::new(),
        };
        let encoder = Encoder::new(digested, compression).map_err(|e| Error::Open(path.to_path_buf(), e))?;

        log::debug!("opened archive writer at {path:?} ({compression:?})");

        Ok(Self {
            builder: tar::Builder::new(encoder),
        })
    }

    pub fn add_file(&mut self, archive_path: &str, contents: &mut impl io::Read, mode: u32) -> Result<(), Error> {
        let mut header = tar::Header::new_gnu();
        header.set_mode(mode);
        header.set_entry_type(tar::EntryType::Regular);

        self.builder
            .append_data(&mut header, archive_path, contents)
            .map_err(|e| Error::Append(archive_path.to_string(), e))
    }

    pub fn add_directory(&mut self, archive_path: &str, mode: u32) -> Result<(), Error> {
        let mut header = tar::Header::new_gnu();
        header.set_mode(mode);
        header.set_size(0);
        header.set_entry_type(tar::EntryType::Directory);

        self.builder
            .append_data(&mut header, archive_path, io::empty())
            .map_err(|e| Error::Append(archive_path.to_string(), e))
    }

    pub fn add_symlink(&mut self, archive_path: &str, target: &str) -> Result<(), Error> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);

        self.builder
            .append_link(&mut header, archive_path, target)
            .map_err(|e| Error::Append(archive_path.to_string(), e))
    }

    /// Flushes the tar trailer and compressor, returning the hex
    /// SHA-256 of the compressed archive.
    pub fn finish(self) -> Result<String, Error> {
        let encoder = self.builder.into_inner().map_err(Error::Finish)?;
        let digested = encoder.finish().map_err(Error::Finish)?;
        Ok(hex::encode(digested.hasher.finalize()))
    }
}
