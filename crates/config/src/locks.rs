// SPDX-FileCopyrightText: Copyright © 2020-2023 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Named exclusive locks with a timeout, backed by `flock(2)`.
//!
//! Advisory between cooperating processes on the same host; there is no
//! dead-process detection beyond what the kernel already gives us when a
//! holder exits and its file descriptor is closed.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use fs_err as fs;
use nix::{
    errno::Errno,
    fcntl::{flock, FlockArg},
};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A named exclusive lock rooted under a locks directory (typically
/// `/var/lib/<app>/locks/`).
pub struct Lock {
    path: PathBuf,
}

impl Lock {
    pub fn new(locks_dir: impl AsRef<Path>, name: impl AsRef<str>) -> Self {
        Self {
            path: locks_dir.as_ref().join(format!("{}.lock", name.as_ref())),
        }
    }

    /// Blocks until the lock is acquired or `timeout` elapses.
    pub fn acquire(&self, timeout: Duration) -> Result<Guard, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io(self.path.clone(), source))?;
        }

        let file = fs::File::create(&self.path).map_err(|source| LockError::Io(self.path.clone(), source))?;

        let deadline = Instant::now() + timeout;

        loop {
            match flock(&file, FlockArg::LockExclusiveNonblock) {
                Ok(()) => {
                    log::debug!("acquired lock {:?}", self.path);
                    return Ok(Guard {
                        path: self.path.clone(),
                        file: file.into(),
                    });
                }
                Err(Errno::EWOULDBLOCK) => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout(self.path.clone()));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => return Err(LockError::Flock(self.path.clone(), source)),
            }
        }
    }
}

/// Held lock; releases on drop regardless of how the holder exits.
pub struct Guard {
    path: PathBuf,
    file: File,
}

impl Drop for Guard {
    fn drop(&mut self) {
        use nix::fcntl::flock;

        if let Err(err) = flock(&self.file, FlockArg::Unlock) {
            log::warn!("failed to release lock {:?}: {err}", self.path);
        }
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out waiting for lock {0:?}")]
    Timeout(PathBuf),
    #[error("io error on lock file {0:?}")]
    Io(PathBuf, #[source] io::Error),
    #[error("flock failed on {0:?}")]
    Flock(PathBuf, #[source] Errno),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempdir();
        let lock = Lock::new(dir.path(), "build-zlib");

        let guard = lock.acquire(Duration::from_secs(1)).unwrap();
        drop(guard);

        // Releases cleanly, so a second acquire succeeds immediately.
        lock.acquire(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn second_holder_times_out() {
        let dir = tempdir();
        let lock = Lock::new(dir.path(), "build-zlib");

        let _held = lock.acquire(Duration::from_secs(1)).unwrap();

        let err = lock.acquire(Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }
}
