// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `epoch:version-release` version identifiers with a total order that
//! splits each version/release string into numeric and non-numeric runs,
//! comparing numeric runs by value and the rest lexically.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evr {
    pub epoch: u64,
    pub version: String,
    pub release: u64,
}

impl Evr {
    pub fn new(epoch: u64, version: impl Into<String>, release: u64) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.epoch, self.version, self.release)
    }
}

impl FromStr for Evr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, rest)) => (e, rest),
            None => ("0", s),
        };
        let epoch = epoch_str.parse().map_err(|_| ParseError::Epoch(epoch_str.to_string()))?;

        let (version, release_str) = rest.rsplit_once('-').ok_or_else(|| ParseError::MissingRelease(s.to_string()))?;
        if version.is_empty() {
            return Err(ParseError::MissingRelease(s.to_string()));
        }
        let release = release_str
            .parse()
            .map_err(|_| ParseError::Release(release_str.to_string()))?;

        Ok(Evr {
            epoch,
            version: version.to_string(),
            release,
        })
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("non-numeric epoch: {0:?}")]
    Epoch(String),
    #[error("missing '-release' in EVR string: {0:?}")]
    MissingRelease(String),
    #[error("non-numeric release: {0:?}")]
    Release(String),
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segmented(&self.version, &other.version))
            .then_with(|| self.release.cmp(&other.release))
    }
}

/// Splits on `.`, `-`, `_` into components, then compares component by
/// component; within a component, further splits into alternating
/// digit/non-digit runs and compares numeric runs numerically.
fn compare_segmented(a: &str, b: &str) -> Ordering {
    let mut a_parts = a.split(['.', '-', '_']);
    let mut b_parts = b.split(['.', '-', '_']);

    loop {
        match (a_parts.next(), b_parts.next()) {
            (Some(x), Some(y)) => {
                let ord = compare_component(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

fn compare_component(a: &str, b: &str) -> Ordering {
    let a_runs = split_runs(a);
    let b_runs = split_runs(b);

    let mut a_iter = a_runs.iter();
    let mut b_iter = b_runs.iter();

    loop {
        match (a_iter.next(), b_iter.next()) {
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

fn split_runs(s: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut current_is_digit: Option<bool> = None;

    for c in s.chars() {
        let is_digit = c.is_ascii_digit();
        if current_is_digit == Some(is_digit) {
            current.push(c);
        } else {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            current.push(c);
            current_is_digit = Some(is_digit);
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let evr = Evr::new(2, "1.2.3", 4);
        assert_eq!(evr.to_string(), "2:1.2.3-4");
        assert_eq!(evr.to_string().parse::<Evr>().unwrap(), evr);
    }

    #[test]
    fn epoch_defaults_to_zero_without_colon() {
        let evr: Evr = "1.2.3-1".parse().unwrap();
        assert_eq!(evr.epoch, 0);
        assert_eq!(evr.version, "1.2.3");
        assert_eq!(evr.release, 1);
    }

    #[test]
    fn orders_by_epoch_first() {
        let low: Evr = "5:0.1-1".parse().unwrap();
        let high: Evr = "0:99.0-1".parse().unwrap();
        assert!(low > high);
    }

    #[test]
    fn compares_version_segments_numerically_not_lexically() {
        let a: Evr = "0:1.9-1".parse().unwrap();
        let b: Evr = "0:1.10-1".parse().unwrap();
        assert!(a < b, "1.9 should sort before 1.10 numerically");
    }

    #[test]
    fn compares_release_numerically() {
        let a: Evr = "0:1.0-2".parse().unwrap();
        let b: Evr = "0:1.0-10".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn equality_coincides_with_component_equality() {
        let a: Evr = "0:1.0-1".parse().unwrap();
        let b: Evr = "0:1.0-1".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}
