// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Runs a recipe's `prepare`/`build`/`install` stages. Each
//! stage gets a fresh subprocess with a pinned environment; hooks
//! dropped into `pre-<stage>.d`/`post-<stage>.d` bracket it. The
//! `install` stage always writes under `DESTDIR` rather than the real
//! root; the chroot variant additionally runs every stage inside a
//! mount-namespace container rooted at the recipe's build directory.

use std::{
    collections::BTreeMap,
    io,
    process::{Command, Stdio},
    time::Duration,
};

use config::{Lock, LockError};
use hooks::When;
use thiserror::Error;

use crate::{env::Env, paths::Paths, recipe::Recipe, util};

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Build,
    Install,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Build => "build",
            Stage::Install => "install",
        }
    }
}

pub struct Engine<'a> {
    pub recipe: &'a Recipe,
    pub paths: &'a Paths,
    pub env: &'a Env,
    pub profile: Option<&'a str>,
    pub chroot: bool,
}

impl<'a> Engine<'a> {
    pub fn new(recipe: &'a Recipe, paths: &'a Paths, env: &'a Env, profile: Option<&'a str>, chroot: bool) -> Self {
        Self {
            recipe,
            paths,
            env,
            profile,
            chroot,
        }
    }

    /// Runs all three stages in order. On failure the build directory
    /// and (if reached) the destdir are left exactly as they are.
    pub fn build(&self) -> Result<(), Error> {
        let lock = Lock::new(self.env.cache_dir.join("locks"), format!("build-{}", self.recipe.nvr()));
        let _guard = lock.acquire(LOCK_TIMEOUT)?;

        self.run_stage(Stage::Prepare)?;
        self.run_stage(Stage::Build)?;

        util::recreate_dir(&self.paths.destdir().host)?;
        self.run_stage(Stage::Install)?;

        Ok(())
    }

    fn run_stage(&self, stage: Stage) -> Result<(), Error> {
        let build = self.recipe.build_for_profile(self.profile);
        let script = match stage {
            Stage::Prepare => build.prepare.clone(),
            Stage::Build => build.build.clone().or_else(|| Some(default_build_script())),
            Stage::Install => build.install.clone().or_else(|| Some(default_install_script())),
        };

        let Some(script) = script else {
            return Ok(());
        };

        let env_vars = self.stage_env();
        let hooks_dir = self.env.data_dir.join("hooks");

        hooks::run(&hooks_dir, When::Pre, stage.as_str(), &env_vars, &[])?;

        if self.chroot {
            self.run_chroot(&script, &env_vars)?;
        } else {
            self.run_plain(&script, &env_vars)?;
        }

        hooks::run(&hooks_dir, When::Post, stage.as_str(), &env_vars, &[])?;

        Ok(())
    }

    fn stage_env(&self) -> BTreeMap<String, String> {
        let source = &self.recipe.parsed.source;
        let mut env = BTreeMap::new();
        env.insert(
            "DESTDIR".to_string(),
            self.paths.destdir().host.to_string_lossy().into_owned(),
        );
        let jobs = match self.env.tunables.max_build_jobs {
            0 => util::num_cpus().get(),
            n => n,
        };
        env.insert("JOBS".to_string(), jobs.to_string());
        env.insert(
            "SOURCE_DATE_EPOCH".to_string(),
            self.recipe.build_time.timestamp().to_string(),
        );
        env.insert("NAME".to_string(), source.name.clone());
        env.insert("VERSION".to_string(), source.version.clone());
        env.insert("EPOCH".to_string(), source.epoch.to_string());
        env.insert("RELEASE".to_string(), source.release.to_string());
        env.insert("PATH".to_string(), "/usr/bin:/usr/sbin".to_string());
        env.insert("LC_ALL".to_string(), "C".to_string());
        env
    }

    fn run_plain(&self, script: &str, env_vars: &BTreeMap<String, String>) -> Result<(), Error> {
        let build_dir = &self.paths.build().host;

        let mut command = Command::new("/bin/sh");
        command
            .arg("-e")
            .arg("-c")
            .arg(script)
            .env_clear()
            .envs(env_vars)
            .current_dir(build_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        run_and_check(command)
    }

    /// Runs the stage inside a mount-namespace container rooted at the
    /// build directory, with only the build/destdir trees bound in and
    /// a sanitized environment — the guest never sees the host root.
    fn run_chroot(&self, script: &str, env_vars: &BTreeMap<String, String>) -> Result<(), Error> {
        let chroot_root = self.paths.chroot_root();
        util::recreate_dir(&chroot_root)?;

        let script_owned = script.to_string();
        let env_owned = env_vars.clone();
        let build_guest = self.paths.build().guest.clone();

        ::container::Container::new(&chroot_root)
            .bind(&self.paths.build().host, &build_guest)
            .bind(&self.paths.destdir().host, &self.paths.destdir().guest)
            .work_dir(&build_guest)
            .run(move || {
                let mut command = Command::new("/bin/sh");
                command
                    .arg("-e")
                    .arg("-c")
                    .arg(&script_owned)
                    .env_clear()
                    .envs(&env_owned)
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());

                let status = command.status()?;
                if !status.success() {
                    return Err(io::Error::new(io::ErrorKind::Other, "stage failed in container").into());
                }
                Ok(())
            })
            .map_err(Error::Container)
    }
}

fn default_build_script() -> String {
    "if [ -x ./configure ]; then ./configure --prefix=/usr; fi\nmake -j\"$JOBS\"".to_string()
}

fn default_install_script() -> String {
    "make install DESTDIR=\"$DESTDIR\"".to_string()
}

fn run_and_check(mut command: Command) -> Result<(), Error> {
    let status = command.status()?;
    if !status.success() {
        return Err(Error::Code(status.code()));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("lock")]
    Lock(#[from] LockError),
    #[error("hook")]
    Hook(#[from] hooks::Error),
    #[error("container")]
    Container(#[source] ::container::Error),
    #[error("stage failed with status {0:?}")]
    Code(Option<i32>),
    #[error("io")]
    Io(#[from] io::Error),
}
