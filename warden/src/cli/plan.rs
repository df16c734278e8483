// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;
use warden::{installation::Installation, planner, record::InstalledRecord};

pub fn command() -> Command {
    Command::new("plan")
        .about("Print the rebuild order without touching anything")
        .arg(arg!([PACKAGE] "Limit to this package and its transitive dependents"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let records = InstalledRecord::list(&installation.installed_dir())?;

    let order = match args.get_one::<String>("PACKAGE") {
        Some(pkg) => planner::plan_changed(&records, pkg)?,
        None => planner::plan_world(&records)?,
    };

    for name in order {
        println!("{name}");
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("installed record")]
    Record(#[from] warden::record::Error),
    #[error("planner")]
    Planner(#[from] planner::Error),
}
