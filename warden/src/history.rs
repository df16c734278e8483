// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Append-only per-package event log: `<history_dir>/<name>.log`, one
//! `timestamp action from-EVR to-EVR` line per event.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use thiserror::Error;

use crate::evr::Evr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Save,
    Install,
    Upgrade,
    Rollback,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Save => "SAVE",
            Action::Install => "INSTALL",
            Action::Upgrade => "UPGRADE",
            Action::Rollback => "ROLLBACK",
        };
        f.write_str(s)
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVE" => Ok(Action::Save),
            "INSTALL" => Ok(Action::Install),
            "UPGRADE" => Ok(Action::Upgrade),
            "ROLLBACK" => Ok(Action::Rollback),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub from_evr: Option<Evr>,
    pub to_evr: Option<Evr>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.action,
            self.from_evr.as_ref().map(Evr::to_string).unwrap_or_else(|| "-".into()),
            self.to_evr.as_ref().map(Evr::to_string).unwrap_or_else(|| "-".into()),
        )
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();

        let timestamp = fields
            .next()
            .ok_or_else(|| Error::Syntax(line.to_string()))
            .and_then(|t| {
                DateTime::parse_from_rfc3339(t)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| Error::Syntax(line.to_string()))
            })?;
        let action = fields
            .next()
            .ok_or_else(|| Error::Syntax(line.to_string()))
            .and_then(str::parse)?;
        let from_evr = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;
        let to_evr = fields.next().ok_or_else(|| Error::Syntax(line.to_string()))?;

        Ok(Event {
            timestamp,
            action,
            from_evr: (from_evr != "-").then(|| from_evr.parse()).transpose().map_err(Error::Evr)?,
            to_evr: (to_evr != "-").then(|| to_evr.parse()).transpose().map_err(Error::Evr)?,
        })
    }
}

fn path_for(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.log"))
}

pub fn append(dir: &Path, name: &str, event: &Event) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|e| Error::Io(dir.to_path_buf(), e))?;

    let path = path_for(dir, name);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::Io(path.clone(), e))?;

    writeln!(file, "{event}").map_err(|e| Error::Io(path, e))
}

pub fn read(dir: &Path, name: &str) -> Result<Vec<Event>, Error> {
    let path = path_for(dir, name);
    match fs::read_to_string(&path) {
        Ok(text) => text.lines().filter(|l| !l.trim().is_empty()).map(str::parse).collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
        Err(err) => Err(Error::Io(path, err)),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("malformed history line: {0:?}")]
    Syntax(String),
    #[error("unknown history action: {0:?}")]
    UnknownAction(String),
    #[error("malformed EVR in history line")]
    Evr(#[from] crate::evr::ParseError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn appends_and_reads_back_events_in_order() {
        let dir = tempfile::tempdir().unwrap();

        append(
            dir.path(),
            "zlib",
            &Event {
                timestamp: Utc::now(),
                action: Action::Install,
                from_evr: None,
                to_evr: Some(Evr::new(0, "1.3", 1)),
            },
        )
        .unwrap();
        append(
            dir.path(),
            "zlib",
            &Event {
                timestamp: Utc::now(),
                action: Action::Upgrade,
                from_evr: Some(Evr::new(0, "1.3", 1)),
                to_evr: Some(Evr::new(0, "1.3", 2)),
            },
        )
        .unwrap();

        let events = read(dir.path(), "zlib").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, Action::Install);
        assert_eq!(events[1].action, Action::Upgrade);
        assert_eq!(events[1].from_evr, Some(Evr::new(0, "1.3", 1)));
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), "nope").unwrap().is_empty());
    }
}
