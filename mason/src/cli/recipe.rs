// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0
use std::path::PathBuf;

use clap::Parser;
use mason::Recipe;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(about = "Utilities to inspect and validate recipe files")]
pub struct Command {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    #[command(about = "Check a recipe file for lint errors")]
    Lint {
        #[arg(default_value = "./recipe.yaml", help = "Path to recipe file")]
        recipe: PathBuf,
    },
    #[command(about = "Print the resolved name, version and release for a recipe")]
    Show {
        #[arg(default_value = "./recipe.yaml", help = "Path to recipe file")]
        recipe: PathBuf,
    },
}

pub fn handle(command: Command) -> Result<(), Error> {
    match command.subcommand {
        Subcommand::Lint { recipe } => lint(recipe),
        Subcommand::Show { recipe } => show(recipe),
    }
}

fn lint(recipe_path: PathBuf) -> Result<(), Error> {
    let recipe = Recipe::load(recipe_path)?;
    recipe.lint()?;
    println!("{} looks good", recipe.nvr());
    Ok(())
}

fn show(recipe_path: PathBuf) -> Result<(), Error> {
    let recipe = Recipe::load(recipe_path)?;
    println!("{}", recipe.nvr());
    println!("build deps: {}", recipe.build_deps().join(", "));
    println!("run deps: {}", recipe.deps().join(", "));
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("load recipe")]
    Load(#[from] mason::recipe::Error),
    #[error("lint recipe")]
    Lint(#[from] recipe::Error),
}
