// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Downloads and caches upstream sources. A plain URL fetch
//! verifies against a pinned sha256 and quarantines a stale cache
//! entry rather than trusting it; a git fetch exports a deterministic
//! tree archive pinned to a ref's commit time.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Utc;
use fs_err as fs;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::util;

/// Retry policy for a fetch, sourced from the `retry_count` /
/// `retry_backoff_base` tunables (exponential backoff, base in seconds).
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl From<&config::Tunables> for Retry {
    fn from(tunables: &config::Tunables) -> Self {
        Self {
            max_attempts: tunables.retry_count.max(1),
            backoff_base: Duration::from_secs_f64(tunables.retry_backoff_base.max(0.0)),
        }
    }
}

/// Downloads `url` into `out_dir`, verifying against `expected_sha256`.
/// A cache hit that matches the hash short-circuits the whole
/// operation; a hit that doesn't is quarantined (renamed aside) so a
/// stale or corrupt cache entry never blocks a fresh fetch.
pub async fn fetch_one(
    url: &Url,
    expected_sha256: &str,
    out_dir: &Path,
    mirrors: &[Url],
    retry: Retry,
) -> Result<PathBuf, Error> {
    let file_name = util::uri_file_name(url);
    let path = out_dir.join(file_name);

    util::ensure_dir_exists(out_dir)?;

    if path.exists() {
        if hash_file(&path).await? == expected_sha256 {
            return Ok(path);
        }
        quarantine(&path).await?;
    }

    let mut candidates = vec![url.clone()];
    candidates.extend(mirrors.iter().map(|mirror| mirror_url(mirror, file_name)));

    for candidate in &candidates {
        match download_with_retries(candidate, &path, expected_sha256, retry).await {
            Ok(()) => return Ok(path),
            Err(err @ Error::HashMismatch { .. }) => return Err(err),
            Err(_) => continue,
        }
    }

    Err(Error::FetchExhausted(url.clone()))
}

fn mirror_url(mirror_root: &Url, file_name: &str) -> Url {
    let mut url = mirror_root.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(file_name);
    }
    url
}

async fn download_with_retries(url: &Url, path: &Path, expected_sha256: &str, retry: Retry) -> Result<(), Error> {
    let partial_path = sibling_with_suffix(path, "part");

    let mut attempt = 0;
    loop {
        attempt += 1;

        match download_once(url, path, &partial_path, expected_sha256).await {
            Ok(()) => return Ok(()),
            Err(err @ Error::HashMismatch { .. }) => return Err(err),
            Err(err) if attempt >= retry.max_attempts => return Err(err),
            Err(_) => {
                tokio::time::sleep(retry.backoff_base * 2u32.pow(attempt - 1)).await;
            }
        }
    }
}

async fn download_once(url: &Url, path: &Path, partial_path: &Path, expected_sha256: &str) -> Result<(), Error> {
    let mut resume_from = 0u64;
    let mut file = if let Ok(meta) = tokio::fs::metadata(partial_path).await {
        resume_from = meta.len();
        tokio::fs::OpenOptions::new().append(true).open(partial_path).await?
    } else {
        tokio::fs::File::create(partial_path).await?
    };

    let client = reqwest::Client::new();
    let mut request = client.get(url.clone());
    if resume_from > 0 {
        request = request.header("Range", format!("bytes={resume_from}-"));
    }

    let response = request.send().await?.error_for_status()?;
    let resumed = response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
    if resume_from > 0 && !resumed {
        // Server ignored the range request; restart from scratch.
        file = tokio::fs::File::create(partial_path).await?;
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;

    let hash = hash_file(partial_path).await?;
    if hash != expected_sha256 {
        tokio::fs::remove_file(partial_path).await?;
        return Err(Error::HashMismatch {
            url: url.clone(),
            expected: expected_sha256.to_string(),
            got: hash,
        });
    }

    tokio::fs::rename(partial_path, path).await?;
    Ok(())
}

async fn quarantine(path: &Path) -> Result<(), Error> {
    let timestamp = Utc::now().timestamp();
    let bad_path = sibling_with_suffix(path, &format!("bad.{timestamp}"));
    tokio::fs::rename(path, bad_path).await?;
    Ok(())
}

/// `<path>.<suffix>` alongside `path`, without disturbing `path`'s own
/// (possibly multi-part, e.g. `.tar.gz`) extension.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    path.with_file_name(format!("{file_name}.{suffix}"))
}

async fn hash_file(path: &Path) -> Result<String, Error> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Shallow-clones `url` at `ref_id`, exports a deterministic tree
/// archive named `<name>-<shortref>.git.<ext>` with `SOURCE_DATE_EPOCH`
/// pinned to the checked-out commit's time, so repeated fetches of the
/// same ref produce byte-identical archives.
pub async fn fetch_git(url: &Url, ref_id: &str, name: &str, out_dir: &Path) -> Result<PathBuf, Error> {
    use tokio::process::Command;

    util::ensure_dir_exists(out_dir)?;

    let short_ref = &ref_id[..ref_id.len().min(8)];
    let archive_path = out_dir.join(format!("{name}-{short_ref}.git.tar.zst"));
    if archive_path.exists() {
        return Ok(archive_path);
    }

    let clone_dir = tempfile::tempdir_in(out_dir)?;
    let clone_path = clone_dir.path();

    run_git(&["clone", "--", url.as_str(), &clone_path.display().to_string()], None).await?;
    run_git(&["checkout", ref_id], Some(clone_path)).await?;
    run_git(
        &["submodule", "update", "--init", "--recursive", "--depth", "1"],
        Some(clone_path),
    )
    .await?;

    let commit_time = commit_time(clone_path, ref_id).await?;

    let mut writer = archive::Writer::create(&archive_path, archive::Compression::Zstd)?;
    for entry in util::enumerate_files(clone_path, |p| !p.components().any(|c| c.as_os_str() == ".git"))? {
        let relative = entry.strip_prefix(clone_path).unwrap_or(&entry).to_string_lossy().into_owned();
        let mut contents = fs::File::open(&entry)?;
        let mode = fs::metadata(&entry)?.permissions().mode_or_default();
        writer.add_file(&relative, &mut contents, mode)?;
    }
    writer.finish()?;

    std::env::set_var("SOURCE_DATE_EPOCH", commit_time.to_string());

    Ok(archive_path)
}

async fn commit_time(repo: &Path, ref_id: &str) -> Result<i64, Error> {
    use tokio::process::Command;

    let output = Command::new("git")
        .args(["show", "-s", "--format=%ct", ref_id])
        .current_dir(repo)
        .output()
        .await?;

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|_| Error::GitFailed(ref_id.to_string()))
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<(), Error> {
    use tokio::process::Command;

    let mut command = Command::new("git");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.args(args).output().await?;
    if !output.status.success() {
        return Err(Error::GitFailed(args.join(" ")));
    }

    Ok(())
}

trait PermissionsExt {
    fn mode_or_default(&self) -> u32;
}

impl PermissionsExt for std::fs::Permissions {
    fn mode_or_default(&self) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        self.mode()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("http request")]
    Request(#[from] reqwest::Error),
    #[error("archive write")]
    ArchiveWrite(#[from] archive::WriteError),
    #[error("hash mismatch for {url}, expected {expected} got {got}")]
    HashMismatch { url: Url, expected: String, got: String },
    #[error("exhausted all mirrors fetching {0}")]
    FetchExhausted(Url),
    #[error("git command failed: {0}")]
    GitFailed(String),
}
