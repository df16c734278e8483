// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Runtime and build-time dependencies are plain package names; there is
//! no virtual-provider indirection in this model.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::evr::Evr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency(pub String);

impl From<String> for Dependency {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The EVR each dependency resolved to at build time, recorded in the
/// [`InstalledRecord`](crate::record::InstalledRecord) so C9's planner can
/// detect drift between a dependency's recorded and current version.
pub type DepVersions = BTreeMap<String, Evr>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dependency_displays_as_bare_name() {
        let dep = Dependency::from("zlib");
        assert_eq!(dep.to_string(), "zlib");
    }
}
