// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use warden::{
    client::install::{self, NewPackage},
    installation::Installation,
};

pub fn command() -> Command {
    Command::new("install")
        .about("Install one or more package archives")
        .arg(arg!(<ARCHIVE> ... "Path to a package archive").value_parser(clap::value_parser!(PathBuf)))
}

/// Applies each archive directly to `root`. Resolving the dependency
/// graph and build fingerprints that go into the installed record is a
/// higher-level concern than this entry point; callers that need it
/// populated (e.g. a build orchestrator finishing a build) should build
/// an [`install::NewPackage`] themselves and call [`install::install_pkg`].
pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let archives = args.get_many::<PathBuf>("ARCHIVE").expect("required");

    for archive_path in archives {
        let pkg = NewPackage {
            archive_path: archive_path.clone(),
            deps: vec![],
            dep_versions: Default::default(),
            environment_fingerprint: String::new(),
            abi_fingerprint: String::new(),
            toolchain_fingerprint: String::new(),
            build_time: Utc::now(),
        };
        let record = install::install_pkg(&installation, pkg)?;
        println!("installed {} {}", record.name, record.evr);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("install")]
    Install(#[from] install::Error),
}
