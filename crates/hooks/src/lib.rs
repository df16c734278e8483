// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Directory-drop hooks: executables under `pre-<stage>.d/` and
//! `post-<stage>.d/` run in lexical order, with stage context passed
//! as environment variables rather than baked into a trigger-
//! definition file. Any non-zero exit aborts the stage.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::Command,
};

use fnmatch::Pattern;
use fs_err as fs;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Pre,
    Post,
}

impl When {
    fn dir_name(self, stage: &str) -> String {
        match self {
            When::Pre => format!("pre-{stage}.d"),
            When::Post => format!("post-{stage}.d"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("read hook directory {0:?}")]
    ReadDir(PathBuf, #[source] std::io::Error),
    #[error("run hook {0:?}")]
    Spawn(PathBuf, #[source] std::io::Error),
    #[error("hook {0:?} exited with status {1}")]
    NonZeroExit(PathBuf, i32),
    #[error("hook {0:?} was terminated by a signal")]
    Signalled(PathBuf),
}

/// Runs every executable hook found under `<hooks_dir>/<when>-<stage>.d/`
/// in lexical filename order, passing `env` to each. A hook may carry a
/// `.match` sidecar file of fnmatch globs, one per line; if present and
/// `changed_paths` is non-empty, the hook only runs when at least one
/// changed path matches one of its globs.
pub fn run(
    hooks_dir: &Path,
    when: When,
    stage: &str,
    env: &BTreeMap<String, String>,
    changed_paths: &[String],
) -> Result<(), Error> {
    let dir = hooks_dir.join(when.dir_name(stage));

    let mut entries = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) != Some("match"))
            .collect::<Vec<_>>(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::ReadDir(dir, err)),
    };
    entries.sort();

    for hook in entries {
        if !is_runnable(&hook) {
            continue;
        }

        if let Some(globs) = sidecar_globs(&hook) {
            let matches = changed_paths.iter().any(|p| globs.iter().any(|g| g.match_path(p).is_some()));
            if !changed_paths.is_empty() && !matches {
                log::debug!("skipping hook {hook:?}: no changed path matches its sidecar globs");
                continue;
            }
        }

        log::info!("running hook {hook:?}");

        let status = Command::new(&hook)
            .envs(env)
            .status()
            .map_err(|e| Error::Spawn(hook.clone(), e))?;

        match status.code() {
            Some(0) => {}
            Some(code) => return Err(Error::NonZeroExit(hook, code)),
            None => return Err(Error::Signalled(hook)),
        }
    }

    Ok(())
}

#[cfg(unix)]
fn is_runnable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_runnable(_path: &Path) -> bool {
    true
}

fn sidecar_globs(hook: &Path) -> Option<Vec<Pattern>> {
    let sidecar = hook.with_extension("match");
    let text = fs::read_to_string(sidecar).ok()?;

    Some(
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| l.trim().parse::<Pattern>().ok())
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn make_executable(path: &Path, script: &str) {
        fs::write(path, script).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn runs_hooks_in_lexical_order_and_aborts_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("post-install.d");
        fs::create_dir_all(&hooks_dir).unwrap();

        let marker = dir.path().join("order.txt");
        make_executable(
            &hooks_dir.join("10-first"),
            &format!("#!/bin/sh\necho first >> {}\n", marker.display()),
        );
        make_executable(&hooks_dir.join("20-second"), "#!/bin/sh\nexit 1\n");
        make_executable(
            &hooks_dir.join("30-third"),
            &format!("#!/bin/sh\necho third >> {}\n", marker.display()),
        );

        let err = run(dir.path(), When::Post, "install", &BTreeMap::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::NonZeroExit(_, 1)));

        let contents = fs::read_to_string(&marker).unwrap();
        assert_eq!(contents, "first\n");
    }

    #[test]
    fn missing_hook_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), When::Pre, "build", &BTreeMap::new(), &[]).unwrap();
    }

    #[test]
    fn skips_hook_when_sidecar_globs_dont_match_changed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let hooks_dir = dir.path().join("post-install.d");
        fs::create_dir_all(&hooks_dir).unwrap();

        let marker = dir.path().join("ran.txt");
        make_executable(
            &hooks_dir.join("10-ldconfig"),
            &format!("#!/bin/sh\necho ran >> {}\n", marker.display()),
        );
        fs::write(hooks_dir.join("10-ldconfig.match"), "/usr/lib/*.so\n").unwrap();

        run(
            dir.path(),
            When::Post,
            "install",
            &BTreeMap::new(),
            &["/usr/share/doc/readme".into()],
        )
        .unwrap();

        assert!(!marker.exists());
    }
}
