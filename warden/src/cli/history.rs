// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use warden::{history, installation::Installation};

pub fn command() -> Command {
    Command::new("history")
        .about("Show the install/upgrade/removal history of a package")
        .arg(arg!(<NAME> "Installed package name"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let name = args.get_one::<String>("NAME").expect("required");

    for event in history::read(&installation.history_dir(), name)? {
        println!("{event}");
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("history")]
    History(#[from] history::Error),
}
