// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use warden::{client::install, installation::Installation};

pub fn command() -> Command {
    Command::new("remove")
        .about("Remove an installed package")
        .arg(arg!(<NAME> "Installed package name"))
        .arg(arg!(-f --force "Remove even if other installed packages still depend on it").action(ArgAction::SetTrue))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let name = args.get_one::<String>("NAME").expect("required");
    let force = args.get_flag("force");

    install::uninstall(&installation, name, force)?;
    println!("removed {name}");

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("remove")]
    Uninstall(#[from] install::Error),
}
