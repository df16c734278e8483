// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use warden::{installation::Installation, record::InstalledRecord};

pub fn command() -> Command {
    Command::new("info")
        .about("Show details for an installed package")
        .arg(arg!(<NAME> "Installed package name"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let installation = Installation::open(root);
    let name = args.get_one::<String>("NAME").expect("required");

    let record = InstalledRecord::load(&installation.installed_dir(), name)?.ok_or_else(|| Error::NotInstalled(name.clone()))?;

    println!("name: {}", record.name);
    println!("version: {}", record.evr);
    println!("installed: {}", record.install_time);
    println!("built: {}", record.build_time);
    println!(
        "deps: {}",
        if record.deps.is_empty() {
            "(none)".to_string()
        } else {
            record.deps.join(", ")
        }
    );
    println!("toolchain fingerprint: {}", record.toolchain_fingerprint);
    println!("environment fingerprint: {}", record.environment_fingerprint);
    println!("abi fingerprint: {}", record.abi_fingerprint);

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("installed record")]
    Record(#[from] warden::record::Error),
    #[error("package {0:?} is not installed")]
    NotInstalled(String),
}
