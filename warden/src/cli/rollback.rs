// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;
use warden::{
    client::rollback::{self, rollback_pkg},
    evr::Evr,
    history,
    installation::Installation,
};

pub fn command() -> Command {
    Command::new("rollback")
        .about("Roll a package back to a previous install")
        .arg(arg!(<NAME> "Installed package name"))
        .arg(arg!(<EVR> "Target epoch:version-release, or \"prev\" for the version before the current one"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let name = args.get_one::<String>("NAME").expect("required");
    let evr_arg = args.get_one::<String>("EVR").expect("required");

    let target_evr = if evr_arg == "prev" {
        previous_evr(&installation, name)?
    } else {
        evr_arg.parse()?
    };

    let record = rollback_pkg(&installation, name, &target_evr, None)?;
    println!("rolled back {} to {}", record.name, record.evr);

    Ok(())
}

/// The EVR a package was at immediately before its last upgrade, for the
/// `rollback <name> prev` shorthand.
fn previous_evr(installation: &Installation, name: &str) -> Result<Evr, Error> {
    history::read(&installation.history_dir(), name)?
        .into_iter()
        .rev()
        .find_map(|event| matches!(event.action, history::Action::Upgrade).then_some(event.from_evr).flatten())
        .ok_or_else(|| Error::NoPreviousVersion(name.to_string()))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("rollback")]
    Rollback(#[from] rollback::Error),
    #[error("history")]
    History(#[from] history::Error),
    #[error("malformed EVR")]
    Evr(#[from] warden::evr::ParseError),
    #[error("no previous version recorded for {0:?}")]
    NoPreviousVersion(String),
}
