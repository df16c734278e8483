// SPDX-FileCopyrightText: Copyright © 2020-2023 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for the key=value global configuration file and its
//! `config.d/*.conf` fragments.

use std::{fmt, path::Path, str::FromStr};

use fs_err as fs;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, line_ending, space0},
    combinator::{eof, map, opt, value},
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for ColorMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            other => Err(ParseError::InvalidValue("color".into(), other.into())),
        }
    }
}

/// The recognized configuration-key superset from the external
/// interface table. Unrecognized keys are preserved verbatim in
/// [`Tunables::unknown`] rather than rejected, so a newer config file
/// loaded by an older binary doesn't lose fields.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub verbosity: u8,
    pub color: ColorMode,
    pub max_build_jobs: usize,
    pub max_parallel_fetches: usize,
    pub mirrors: Vec<String>,
    pub log_timezone: Option<String>,
    pub retry_count: u32,
    pub retry_backoff_base: f64,
    pub unknown: Vec<(String, String)>,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            verbosity: 0,
            color: ColorMode::Auto,
            max_build_jobs: 0,
            max_parallel_fetches: 4,
            mirrors: Vec::new(),
            log_timezone: None,
            retry_count: 3,
            retry_backoff_base: 1.0,
            unknown: Vec::new(),
        }
    }
}

impl Tunables {
    /// Loads `<dir>/config` merged with every `<dir>/config.d/*.conf`
    /// fragment, in lexical filename order, later files overriding
    /// earlier ones key-by-key.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ParseError> {
        let dir = dir.as_ref();
        let mut tunables = Tunables::default();

        let base = dir.join("config");
        if let Ok(text) = fs::read_to_string(&base) {
            tunables.apply(parse(&text)?);
        }

        let fragments_dir = dir.join("config.d");
        if let Ok(entries) = fs::read_dir(&fragments_dir) {
            let mut paths = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("conf"))
                .collect::<Vec<_>>();
            paths.sort();

            for path in paths {
                let text = fs::read_to_string(&path).map_err(|_| ParseError::Io(path.clone()))?;
                tunables.apply(parse(&text)?);
            }
        }

        Ok(tunables)
    }

    fn apply(&mut self, entries: Vec<(String, String)>) {
        for (key, value) in entries {
            match key.as_str() {
                "verbosity" => {
                    if let Ok(v) = value.parse() {
                        self.verbosity = v;
                    }
                }
                "color" => {
                    if let Ok(mode) = value.parse() {
                        self.color = mode;
                    }
                }
                "max_build_jobs" => {
                    if let Ok(v) = value.parse() {
                        self.max_build_jobs = v;
                    }
                }
                "max_parallel_fetches" => {
                    if let Ok(v) = value.parse() {
                        self.max_parallel_fetches = v;
                    }
                }
                "mirrors" => {
                    self.mirrors = value.split_whitespace().map(str::to_owned).collect();
                }
                "log_timezone" => {
                    self.log_timezone = Some(value);
                }
                "retry_count" => {
                    if let Ok(v) = value.parse() {
                        self.retry_count = v;
                    }
                }
                "retry_backoff_base" => {
                    if let Ok(v) = value.parse() {
                        self.retry_backoff_base = v;
                    }
                }
                _ => {
                    log::debug!("unrecognized config key {key:?}, preserving verbatim");
                    self.unknown.retain(|(k, _)| k != &key);
                    self.unknown.push((key, value));
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("read config file {0:?}")]
    Io(std::path::PathBuf),
    #[error("malformed line {0:?}")]
    Syntax(String),
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(String, String),
}

impl fmt::Display for Tunables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verbosity={} color={:?} max_build_jobs={} max_parallel_fetches={}",
            self.verbosity, self.color, self.max_build_jobs, self.max_parallel_fetches
        )
    }
}

/// Parses a full key=value file: blank lines and `#`-prefixed comment
/// lines are skipped, everything else must be `key = value` or `key=value`.
fn parse(input: &str) -> Result<Vec<(String, String)>, ParseError> {
    let (rest, entries) = many0(line)(input).map_err(|_| ParseError::Syntax(input.into()))?;

    if !rest.trim().is_empty() {
        return Err(ParseError::Syntax(rest.into()));
    }

    Ok(entries.into_iter().flatten().collect())
}

fn line(input: &str) -> IResult<&str, Option<(String, String)>> {
    if input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)));
    }

    terminated(alt((comment_or_blank, map(key_value, Some))), end_of_line)(input)
}

fn comment_or_blank(input: &str) -> IResult<&str, Option<(String, String)>> {
    value(None, tuple((space0, opt(preceded(char('#'), is_not("\r\n"))))))(input)
}

fn key_value(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = space0(input)?;
    let (input, key) = is_not(" \t=#\r\n")(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = is_not("\r\n")(input)?;

    Ok((input, (key.trim().to_string(), value.trim().to_string())))
}

fn end_of_line(input: &str) -> IResult<&str, ()> {
    value((), alt((line_ending, eof)))(input)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_comments_and_blank_lines() {
        let text = "# a comment\n\nverbosity = 2\ncolor=never\n";
        let entries = parse(text).unwrap();
        assert_eq!(
            entries,
            vec![("verbosity".into(), "2".into()), ("color".into(), "never".into())]
        );
    }

    #[test]
    fn unrecognized_keys_are_preserved() {
        let mut tunables = Tunables::default();
        tunables.apply(vec![("some_future_key".into(), "42".into())]);
        assert_eq!(tunables.unknown, vec![("some_future_key".to_string(), "42".to_string())]);
    }

    #[test]
    fn mirrors_are_space_separated() {
        let mut tunables = Tunables::default();
        tunables.apply(parse("mirrors = https://a.example/ https://b.example/\n").unwrap());
        assert_eq!(tunables.mirrors, vec!["https://a.example/", "https://b.example/"]);
    }
}
