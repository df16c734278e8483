// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, Read},
    path::Path,
};

use fs_err::File;
use thiserror::Error;

use crate::Compression;

#[derive(Debug, Error)]
pub enum Error {
    #[error("open archive {0:?}")]
    Open(std::path::PathBuf, #[source] io::Error),
    #[error("read archive entry")]
    Entry(#[source] io::Error),
}

enum Decoder<R: Read> {
    Zstd(Box<zstd::Decoder<'static, io::BufReader<R>>>),
    Gzip(flate2::read::GzDecoder<R>),
    Xz(xz2::read::XzDecoder<R>),
    Bzip2(bzip2::read::BzDecoder<R>),
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Zstd(d) => d.read(buf),
            Decoder::Gzip(d) => d.read(buf),
            Decoder::Xz(d) => d.read(buf),
            Decoder::Bzip2(d) => d.read(buf),
        }
    }
}

impl<R: Read> Decoder<R> {
    fn new(inner: R, compression: Compression) -> io::Result<Self> {
        Ok(match compression {
            Compression::Zstd => Decoder::Zstd(Box::new(zstd::Decoder::new(inner)?)),
            Compression::Gzip => Decoder::Gzip(flate2::read::GzDecoder::new(inner)),
            Compression::Xz => Decoder::Xz(xz2::read::XzDecoder::new(inner)),
            Compression::Bzip2 => Decoder::Bzip2(bzip2::read::BzDecoder::new(inner)),
        })
    }
}

/// Opens a package archive for reading, yielding its tar entries
/// through the standard `tar` crate's own entry iterator.
pub struct Reader {
    archive: tar::Archive<Decoder<File>>,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>, compression: Compression) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::Open(path.to_path_buf(), e))?;
        let decoder = Decoder::new(file, compression).map_err(|e| Error::Open(path.to_path_buf(), e))?;

        log::debug!("opened archive reader at {path:?} ({compression:?})");

        Ok(Self {
            archive: tar::Archive::new(decoder),
        })
    }

    pub fn entries(&mut self) -> Result<tar::Entries<'_, Decoder<File>>, Error> {
        self.archive.entries().map_err(Error::Entry)
    }
}
