// src/node/requirement.rs

//! Minimum versions of external programs.
//!
//! A [`Requirement`] names a program, the command that makes it print its
//! version, and a regex whose capture groups are the numeric parts of that
//! version. Requirements are checked once, while the graph is built, through
//! a [`VersionQuery`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::process::{Command, Stdio};
use std::str::FromStr;

use regex::Regex;

use crate::errors::{PipelineError, Result};

/// A dotted version number, e.g. `1.10.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(Vec<u32>);

impl Version {
    pub fn new(parts: impl Into<Vec<u32>>) -> Self {
        Self(parts.into())
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// Missing trailing parts count as zero, so `1.2` satisfies `1.2.0`.
    pub fn at_least(&self, minimum: &Version) -> bool {
        let len = self.0.len().max(minimum.0.len());
        let padded = |v: &Version| -> Vec<u32> {
            (0..len).map(|i| v.0.get(i).copied().unwrap_or(0)).collect()
        };
        padded(self) >= padded(minimum)
    }
}

impl FromStr for Version {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::ConfigError(format!("invalid version {s:?}: {e}")))?;
        Ok(Self(parts))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "v{}", parts.join("."))
    }
}

/// A program that must be present in at least a given version.
#[derive(Debug, Clone)]
pub struct Requirement {
    name: String,
    call: Vec<String>,
    search: Regex,
    minimum: Version,
    priority: i32,
}

impl Requirement {
    /// `call` is run without a shell; its stdout and stderr are searched
    /// with `search`, whose capture groups must all be numbers.
    pub fn new<I, S>(name: impl Into<String>, call: I, search: &str, minimum: Version) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let call: Vec<String> = call.into_iter().map(Into::into).collect();
        if call.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "requirement '{name}' has an empty version command"
            )));
        }
        let search = Regex::new(search).map_err(|e| {
            PipelineError::ConfigError(format!("requirement '{name}' has an invalid pattern: {e}"))
        })?;
        if search.captures_len() < 2 {
            return Err(PipelineError::ConfigError(format!(
                "requirement '{name}' pattern {:?} has no capture groups",
                search.as_str()
            )));
        }
        Ok(Self {
            name,
            call,
            search,
            minimum,
            priority: 0,
        })
    }

    /// Requirements with a higher priority are checked first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self) -> &[String] {
        &self.call
    }

    pub fn search(&self) -> &Regex {
        &self.search
    }

    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The version found in `output`, if the pattern matches and every group
    /// is a number.
    pub fn parse_version(&self, output: &str) -> Option<Version> {
        let caps = self.search.captures(output)?;
        caps.iter()
            .skip(1)
            .map(|group| group?.as_str().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()
            .map(Version)
    }

    /// Check the output of the version command against the minimum.
    pub fn check(&self, output: &str) -> std::result::Result<Version, String> {
        let found = self.parse_version(output).ok_or_else(|| {
            format!(
                "{}: could not determine version from the output of `{}`",
                self.name,
                self.call.join(" ")
            )
        })?;
        if found.at_least(&self.minimum) {
            Ok(found)
        } else {
            Err(format!(
                "{}: {} found, but at least {} is required",
                self.name, found, self.minimum
            ))
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.call == other.call
            && self.search.as_str() == other.search.as_str()
            && self.minimum == other.minimum
            && self.priority == other.priority
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.call.hash(state);
        self.search.as_str().hash(state);
        self.minimum.hash(state);
        self.priority.hash(state);
    }
}

/// Runs version commands.
pub trait VersionQuery: Send + Sync + fmt::Debug {
    /// Everything `call` printed, stdout followed by stderr. The exit status
    /// is ignored; plenty of tools exit non-zero after printing usage.
    fn output(&self, call: &[String]) -> io::Result<String>;
}

/// Runs version commands as real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemVersionQuery;

impl VersionQuery for SystemVersionQuery {
    fn output(&self, call: &[String]) -> io::Result<String> {
        let (program, args) = call
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty version command"))?;
        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(text)
    }
}
