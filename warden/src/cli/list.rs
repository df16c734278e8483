// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{ArgMatches, Command};
use thiserror::Error;

use warden::{installation::Installation, record::InstalledRecord};

pub fn command() -> Command {
    Command::new("list").about("List installed packages")
}

pub fn handle(_args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);

    for record in InstalledRecord::list(&installation.installed_dir())? {
        println!("{} {}", record.name, record.evr);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("installed record")]
    Record(#[from] warden::record::Error),
}
