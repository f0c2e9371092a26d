//! Domain types shared by the update subsystem and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A version marker read from the installation's source tree.
///
/// Compared as an opaque string: the update logic only cares whether the
/// marker changed across a sync, not whether it went up or down.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    /// Sentinel returned when the marker is missing or unreadable.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_owned())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a git remote (e.g. `origin`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteName(pub String);

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RemoteName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of the remote reference branch (e.g. `main`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(pub String);

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-invocation switches, built once at the CLI boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Rebuild and replace even if the version marker did not change.
    pub force: bool,
    /// Only report whether an update is available; never mutate anything.
    pub check_only: bool,
}

// ---------------------------------------------------------------------------
// Replacement strategy
// ---------------------------------------------------------------------------

/// Configured swap strategy. `Auto` resolves to a [`ReplacementPlan`] based on
/// the platform the binary was compiled for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementStrategy {
    #[default]
    Auto,
    Immediate,
    Deferred,
}

impl ReplacementStrategy {
    pub fn plan(self) -> ReplacementPlan {
        match self {
            ReplacementStrategy::Auto => ReplacementPlan::for_platform(),
            ReplacementStrategy::Immediate => ReplacementPlan::Immediate,
            ReplacementStrategy::Deferred => ReplacementPlan::Deferred,
        }
    }
}

impl FromStr for ReplacementStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "immediate" => Ok(Self::Immediate),
            "deferred" => Ok(Self::Deferred),
            other => Err(format!(
                "unknown strategy '{other}'; expected: auto, immediate, deferred"
            )),
        }
    }
}

/// How the candidate binary is promoted to the live path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPlan {
    /// Rename the candidate over the live executable right away.
    Immediate,
    /// Hand the swap to a detached helper that waits for the tool to exit.
    Deferred,
}

impl ReplacementPlan {
    /// Windows refuses to replace the file backing a running process.
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            ReplacementPlan::Deferred
        } else {
            ReplacementPlan::Immediate
        }
    }
}

impl fmt::Display for ReplacementPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPlan::Immediate => f.write_str("immediate"),
            ReplacementPlan::Deferred => f.write_str("deferred"),
        }
    }
}
