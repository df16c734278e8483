// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The rebuild planner operates over the installed-package database: it
//! turns declared `deps` into a graph and answers "what order do I build
//! the whole world in", "what depends on this one package", and "what
//! actually needs rebuilding right now".

use std::collections::BTreeSet;

use dag::Dag;
use thiserror::Error;

use crate::{evr::Evr, record::InstalledRecord};

fn build_graph(records: &[InstalledRecord]) -> Dag<String> {
    let mut graph = Dag::new();

    for record in records {
        graph.add_node_or_get_index(record.name.clone());
    }
    for record in records {
        let dependent = graph.add_node_or_get_index(record.name.clone());
        for dep in &record.deps {
            let dependency = graph.add_node_or_get_index(dep.clone());
            graph.add_edge(dependency, dependent);
        }
    }

    graph
}

/// Topological order of every installed package.
pub fn plan_world(records: &[InstalledRecord]) -> Result<Vec<String>, Error> {
    build_graph(records).toposort().map_err(|e| Error::Cycle(e.nodes().to_vec()))
}

/// `{pkg}` plus its transitive dependents, topologically ordered.
pub fn plan_changed(records: &[InstalledRecord], pkg: &str) -> Result<Vec<String>, Error> {
    let graph = build_graph(records);
    let world = graph.toposort().map_err(|e| Error::Cycle(e.nodes().to_vec()))?;

    let Some(start) = graph.get_index(&pkg.to_string()) else {
        return Ok(vec![]);
    };

    let dependents: BTreeSet<String> = graph.dfs(start).cloned().collect();
    Ok(world.into_iter().filter(|name| dependents.contains(name)).collect())
}

/// Per-package drift signals the caller has already computed; any `true`
/// field marks the package dirty for [`plan_smart`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Drift {
    pub toolchain_changed: bool,
    pub environment_changed: bool,
    pub dependency_evr_drifted: bool,
    pub abi_drifted: bool,
}

impl Drift {
    pub fn is_dirty(&self) -> bool {
        self.toolchain_changed || self.environment_changed || self.dependency_evr_drifted || self.abi_drifted
    }
}

/// Compares a record's recorded `dep_versions` against each dependency's
/// current installed EVR, used to populate [`Drift::dependency_evr_drifted`].
pub fn dependency_evr_drifted(record: &InstalledRecord, current: &std::collections::BTreeMap<String, Evr>) -> bool {
    record
        .dep_versions
        .iter()
        .any(|(name, recorded)| current.get(name).is_some_and(|now| now != recorded))
}

/// Packages where `is_dirty` holds for at least one drift signal, closed
/// under transitive dependents, topologically ordered.
pub fn plan_smart(records: &[InstalledRecord], is_dirty: impl Fn(&InstalledRecord) -> bool) -> Result<Vec<String>, Error> {
    let graph = build_graph(records);
    let world = graph.toposort().map_err(|e| Error::Cycle(e.nodes().to_vec()))?;

    let mut dirty: BTreeSet<String> = records
        .iter()
        .filter(|record| is_dirty(record))
        .map(|record| record.name.clone())
        .collect();

    let seeds = dirty.clone();
    for name in seeds {
        if let Some(idx) = graph.get_index(&name) {
            dirty.extend(graph.dfs(idx).cloned());
        }
    }

    Ok(world.into_iter().filter(|name| dirty.contains(name)).collect())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cycle detected among packages: {0:?}")]
    Cycle(Vec<String>),
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use std::{collections::BTreeMap, path::PathBuf};

    use super::*;

    fn record(name: &str, deps: &[&str]) -> InstalledRecord {
        InstalledRecord {
            name: name.to_string(),
            evr: Evr::new(0, "1.0", 1),
            target_root: PathBuf::from("/"),
            archive_path: PathBuf::new(),
            manifest_path: PathBuf::new(),
            install_time: Utc::now(),
            build_time: Utc::now(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            dep_versions: BTreeMap::new(),
            environment_fingerprint: String::new(),
            abi_fingerprint: String::new(),
            toolchain_fingerprint: String::new(),
        }
    }

    #[test]
    fn plan_world_orders_dependencies_first() {
        let records = vec![record("libpng", &["zlib"]), record("zlib", &[])];
        let plan = plan_world(&records).unwrap();
        assert_eq!(plan, vec!["zlib".to_string(), "libpng".to_string()]);
    }

    #[test]
    fn plan_changed_includes_transitive_dependents() {
        let records = vec![
            record("app", &["libpng"]),
            record("libpng", &["zlib"]),
            record("zlib", &[]),
        ];
        let plan = plan_changed(&records, "zlib").unwrap();
        assert_eq!(plan, vec!["zlib".to_string(), "libpng".to_string(), "app".to_string()]);
    }

    #[test]
    fn plan_smart_closes_dirty_set_under_dependents() {
        let records = vec![
            record("app", &["libpng"]),
            record("libpng", &["zlib"]),
            record("zlib", &[]),
        ];
        let plan = plan_smart(&records, |r| r.name == "zlib").unwrap();
        assert_eq!(plan, vec!["zlib".to_string(), "libpng".to_string(), "app".to_string()]);
    }
}
