// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser};
use clap_complete::{
    generate_to,
    shells::{Bash, Fish, Zsh},
};
use clap_mangen::Man;
use fs_err::{self as fs, File};
use mason::{env, Env};
use thiserror::Error;

mod build;
mod recipe;
mod version;

#[derive(Debug, Parser)]
pub struct Command {
    #[command(flatten)]
    pub global: Global,
    #[command(subcommand)]
    pub subcommand: Option<Subcommand>,
}

#[derive(Debug, Args)]
pub struct Global {
    #[arg(
        short,
        long = "verbose",
        help = "Prints additional information about what mason is doing",
        default_value = "false",
        global = true
    )]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub install_root: Option<PathBuf>,
    #[arg(long, global = true, hide = true)]
    pub generate_manpages: Option<PathBuf>,
    #[arg(long, global = true, hide = true)]
    pub generate_completions: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    Build(build::Command),
    Recipe(recipe::Command),
    Version(version::Command),
}

pub fn process() -> Result<(), Error> {
    let Command { global, subcommand } = Command::parse();

    if let Some(dir) = global.generate_manpages {
        fs::create_dir_all(&dir)?;
        let main_cmd = Command::command();
        let main_man = Man::new(main_cmd.clone());
        let mut buffer = File::create(dir.join("mason.1"))?;
        main_man.render(&mut buffer)?;

        for sub in main_cmd.get_subcommands() {
            let sub_man = Man::new(sub.clone());
            let name = format!("mason-{}.1", sub.get_name());
            let mut buffer = File::create(dir.join(&name))?;
            sub_man.render(&mut buffer)?;

            for nested in sub.get_subcommands() {
                let nested_man = Man::new(nested.clone());
                let name = format!("mason-{}-{}.1", sub.get_name(), nested.get_name());
                let mut buffer = File::create(dir.join(&name))?;
                nested_man.render(&mut buffer)?;
            }
        }
        return Ok(());
    }

    if let Some(dir) = global.generate_completions {
        fs::create_dir_all(&dir)?;
        let mut cmd = Command::command();
        generate_to(Bash, &mut cmd, "mason", &dir)?;
        generate_to(Fish, &mut cmd, "mason", &dir)?;
        generate_to(Zsh, &mut cmd, "mason", &dir)?;
        return Ok(());
    }

    let env = Env::new(global.cache_dir, global.config_dir, global.data_dir, global.install_root)?;

    if global.verbose || env.tunables.verbosity > 0 {
        match subcommand {
            Some(Subcommand::Version(_)) => (),
            _ => version::print(),
        }
        println!("cache directory: {:?}", env.cache_dir);
        println!("data directory: {:?}", env.data_dir);
        println!("install root: {:?}", env.install_root);
    }

    match subcommand {
        Some(Subcommand::Build(command)) => build::handle(command, env)?,
        Some(Subcommand::Recipe(command)) => recipe::handle(command)?,
        Some(Subcommand::Version(command)) => version::handle(command),
        None => (),
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("build")]
    Build(#[from] build::Error),
    #[error("recipe")]
    Recipe(#[from] recipe::Error),
    #[error("env")]
    Env(#[from] env::Error),
    #[error("io error")]
    Io(#[from] std::io::Error),
}
