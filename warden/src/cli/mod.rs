// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use thiserror::Error;

mod completions;
mod history;
mod info;
mod install;
mod list;
mod plan;
mod remove;
mod rollback;
mod version;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new(warden::APP_NAME)
        .about("Source-based package manager")
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("root")
                .short('D')
                .long("directory")
                .global(true)
                .help("Root directory")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set)
                .default_value("/"),
        )
        .arg_required_else_help(true)
        .subcommand(completions::command())
        .subcommand(history::command())
        .subcommand(info::command())
        .subcommand(install::command())
        .subcommand(list::command())
        .subcommand(plan::command())
        .subcommand(remove::command())
        .subcommand(rollback::command())
        .subcommand(version::command())
}

/// Process all CLI arguments
pub fn process() -> Result<(), Error> {
    let cli = command();
    let matches = cli.clone().get_matches();

    if matches.get_flag("version") {
        version::print();
        return Ok(());
    }

    let root = matches.get_one::<PathBuf>("root").expect("has a default").clone();

    match matches.subcommand() {
        Some(("completions", args)) => {
            completions::handle(args, cli);
            Ok(())
        }
        Some(("history", args)) => history::handle(args, &root).map_err(Error::History),
        Some(("info", args)) => info::handle(args, &root).map_err(Error::Info),
        Some(("install", args)) => install::handle(args, &root).map_err(Error::Install),
        Some(("list", args)) => list::handle(args, &root).map_err(Error::List),
        Some(("plan", args)) => plan::handle(args, &root).map_err(Error::Plan),
        Some(("remove", args)) => remove::handle(args, &root).map_err(Error::Remove),
        Some(("rollback", args)) => rollback::handle(args, &root).map_err(Error::Rollback),
        Some(("version", _)) => {
            version::print();
            Ok(())
        }
        _ => unreachable!("clap enforces a subcommand or --version"),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("history")]
    History(#[from] history::Error),
    #[error("info")]
    Info(#[from] info::Error),
    #[error("install")]
    Install(#[from] install::Error),
    #[error("list")]
    List(#[from] list::Error),
    #[error("plan")]
    Plan(#[from] plan::Error),
    #[error("remove")]
    Remove(#[from] remove::Error),
    #[error("rollback")]
    Rollback(#[from] rollback::Error),
}
