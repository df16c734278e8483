// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{io, path::PathBuf};

use chrono::Local;
use clap::Parser;
use futures_util::{stream, StreamExt, TryStreamExt};
use mason::{build, extract, fetch, package, paths::Paths, recipe, Env, Recipe};
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(about = "Build a package from a recipe")]
pub struct Command {
    #[arg(short, long, help = "Build inside a mount-namespace container rather than in-place")]
    chroot: bool,
    #[arg(short, long, default_value = ".", help = "Directory to store build results")]
    output: PathBuf,
    #[arg(default_value = "./recipe.yaml", help = "Path to recipe file")]
    recipe: PathBuf,
    #[arg(short, long, help = "Build variable profile to use, if the recipe declares one")]
    profile: Option<String>,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    let Command {
        chroot,
        output,
        recipe: recipe_path,
        profile,
    } = command;

    if !output.exists() {
        return Err(Error::MissingOutput(output));
    }

    let recipe = Recipe::load(&recipe_path)?;
    recipe.lint()?;

    let paths = Paths::new(&recipe, env.cache_dir.clone(), "/mason")?;

    fetch_sources(&recipe, &paths, &env)?;
    prepare_workspace(&recipe, &paths)?;

    let engine = build::Engine::new(&recipe, &paths, &env, profile.as_deref(), chroot);
    engine.build()?;

    let artefacts = paths.artefacts().host;
    let result = package::package(&recipe, &env, &paths.destdir().host, &artefacts)?;

    mason::util::hardlink_or_copy(&result.archive_path, &output.join(result.archive_path.file_name().expect("named")))?;
    mason::util::hardlink_or_copy(&result.manifest_path, &output.join(result.manifest_path.file_name().expect("named")))?;

    println!(
        "Build finished successfully at {}",
        Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );
    println!("package: {}", result.archive_path.display());
    println!("manifest: {}", result.manifest_path.display());

    Ok(())
}

/// Fetches every source and patch artefact, bounded to at most
/// `max_parallel_fetches` concurrent downloads, then the git source (if
/// any) once the plain artefacts are in place.
fn fetch_sources(recipe: &Recipe, paths: &Paths, env: &Env) -> Result<(), Error> {
    let runtime = tokio::runtime::Runtime::new()?;
    let out_dir = paths.sources().host;

    let retry = fetch::Retry::from(&env.tunables);
    let mirrors = env
        .tunables
        .mirrors
        .iter()
        .filter_map(|mirror| mirror.parse().ok())
        .collect::<Vec<_>>();
    let concurrency = env.tunables.max_parallel_fetches.max(1);

    let jobs: Vec<_> = recipe
        .parsed
        .sources
        .iter()
        .map(|source| (source.url.clone(), source.hash.clone()))
        .chain(recipe.parsed.patches.iter().map(|patch| (patch.url.clone(), patch.hash.clone())))
        .collect();

    runtime.block_on(async {
        stream::iter(jobs.iter())
            .map(|(url, hash)| fetch::fetch_one(url, hash, &out_dir, &mirrors, retry))
            .buffer_unordered(concurrency)
            .try_for_each(|_| async { Ok(()) })
            .await?;

        if let Some(git) = &recipe.parsed.git {
            fetch::fetch_git(&git.url, &git.reference, &recipe.parsed.source.name, &out_dir).await?;
        }

        Ok::<_, fetch::Error>(())
    })?;

    Ok(())
}

fn prepare_workspace(recipe: &Recipe, paths: &Paths) -> Result<(), Error> {
    let out_dir = paths.sources().host;
    let build_dir = paths.build().host;

    let Some(primary) = recipe.parsed.sources.first() else {
        return Ok(());
    };

    let archive_path = out_dir.join(mason::util::uri_file_name(&primary.url));
    extract::extract(&archive_path, &build_dir)?;

    let patch_paths = recipe
        .parsed
        .patches
        .iter()
        .map(|patch| out_dir.join(mason::util::uri_file_name(&patch.url)))
        .collect::<Vec<_>>();

    if !patch_paths.is_empty() {
        extract::apply_patches(&build_dir, &patch_paths)?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("output directory does not exist: {0:?}")]
    MissingOutput(PathBuf),
    #[error("load recipe")]
    LoadRecipe(#[from] mason::recipe::Error),
    #[error("lint recipe")]
    LintRecipe(#[from] recipe::Error),
    #[error("fetch sources")]
    Fetch(#[from] fetch::Error),
    #[error("extract sources")]
    Extract(#[from] extract::Error),
    #[error("build")]
    Build(#[from] build::Error),
    #[error("package")]
    Package(#[from] package::Error),
    #[error("io")]
    Io(#[from] io::Error),
}
