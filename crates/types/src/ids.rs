//! Workspace and release identifiers.

use crate::TextError;
use std::{fmt, str::FromStr};
use uuid::Uuid;

const MAX_WORKSPACE_NAME_LEN: usize = 255;

/// Name of a workspace directory directly under the workspaces root.
///
/// A workspace name is exactly one path segment: it never contains a separator, is never
/// `.`/`..`, and never starts with `.` (hidden entries are reserved for lock files and
/// other bookkeeping written by job runners).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceName(String);

impl WorkspaceName {
    /// Validates an externally supplied workspace name.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidWorkspaceName`] if `input` is empty, hidden, too long, or
    /// contains a path separator or NUL byte.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref();
        let valid = !input.is_empty()
            && input.len() <= MAX_WORKSPACE_NAME_LEN
            && !input.starts_with('.')
            && !input.contains(['/', '\\', '\0']);

        if valid {
            Ok(Self(input.to_owned()))
        } else {
            Err(TextError::InvalidWorkspaceName(input.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkspaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for WorkspaceName {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkspaceName {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkspaceName> for String {
    fn from(value: WorkspaceName) -> Self {
        value.0
    }
}

/// Opaque release identifier in canonical form (32 lowercase hex characters, no hyphens).
///
/// New identifiers come from a version 4 UUID, so they are drawn from the operating system's
/// CSPRNG and cannot be enumerated. Externally supplied identifiers must already be
/// canonical; hyphenated or uppercase forms are rejected rather than normalised so that a
/// release id maps to exactly one directory name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseId(Uuid);

impl Default for ReleaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseId {
    /// Generates a fresh random release id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a release id that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidReleaseId`] if `input` is not canonical.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        if !Self::is_canonical(input) {
            return Err(TextError::InvalidReleaseId(input.to_owned()));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|_| TextError::InvalidReleaseId(input.to_owned()))
    }

    /// Returns true if `input` is exactly 32 lowercase hex characters.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ReleaseId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReleaseId {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReleaseId> for String {
    fn from(value: ReleaseId) -> Self {
        value.to_string()
    }
}
