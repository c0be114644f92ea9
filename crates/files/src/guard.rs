//! Root-scoped path resolution.
//!
//! [`PathGuard`] is the single place where a caller-supplied relative path is turned into a
//! filesystem path. Resolution happens in two stages:
//!
//! 1. **Lexical**: backslashes are treated as separators, empty and `.` segments are dropped,
//!    and absolute paths or any `..` segment are rejected outright. This produces the
//!    normalised forward-slash form used in manifests and release metadata.
//! 2. **Physical**: the normalised path is joined onto the canonical root and canonicalised,
//!    following symlinks. The result must still live under the root, which catches symlinks
//!    pointing outside it.
//!
//! The root is canonicalised once at construction, so comparisons are between canonical forms.

use crate::{FilesError, FilesResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Whether an empty (or `.`-only) relative path may resolve to the root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPolicy {
    Deny,
    Allow,
}

/// A path confirmed to exist under a guard's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical absolute path.
    pub absolute: PathBuf,
    /// Normalised forward-slash path relative to the root; empty for the root itself.
    pub relative: String,
}

/// Resolves relative paths against one canonical root directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Creates a guard for `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRootDirectory`] if the root does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root: &Path) -> FilesResult<Self> {
        if !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Not an existing directory: {}",
                root.display()
            )));
        }

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    /// Returns the canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` to an existing path strictly below the root.
    pub fn resolve(&self, relative: &str) -> FilesResult<ResolvedPath> {
        self.resolve_with(relative, RootPolicy::Deny)
    }

    /// Resolves `relative` to an existing path under the root.
    ///
    /// # Errors
    ///
    /// - [`FilesError::PathTraversal`] if the path is absolute, contains `..`, is empty while
    ///   `policy` is [`RootPolicy::Deny`], or resolves (via symlinks) outside the root
    /// - [`FilesError::NotFound`] if the path is well formed but does not exist
    /// - [`FilesError::Io`] for any other filesystem failure
    pub fn resolve_with(&self, relative: &str, policy: RootPolicy) -> FilesResult<ResolvedPath> {
        let normalised = normalise(relative, policy)?;
        let candidate = self.root.join(&normalised);

        let absolute = match candidate.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FilesError::NotFound(normalised));
            }
            Err(e) => return Err(FilesError::Io(e)),
        };

        if !absolute.starts_with(&self.root) {
            return Err(FilesError::PathTraversal(relative.to_owned()));
        }
        if absolute == self.root && policy == RootPolicy::Deny {
            return Err(FilesError::PathTraversal(relative.to_owned()));
        }

        Ok(ResolvedPath {
            absolute,
            relative: normalised,
        })
    }

    /// Joins an already-normalised relative path onto the root without touching the disk.
    ///
    /// Used for destinations that do not exist yet. The path is re-normalised, so passing
    /// unvalidated input here is still rejected.
    pub fn join(&self, relative: &str) -> FilesResult<PathBuf> {
        let normalised = normalise(relative, RootPolicy::Deny)?;
        Ok(self.root.join(normalised))
    }
}

/// Lexically normalises a caller-supplied relative path to forward-slash form.
pub(crate) fn normalise(relative: &str, policy: RootPolicy) -> FilesResult<String> {
    let traversal = || FilesError::PathTraversal(relative.to_owned());

    if relative.contains('\0') {
        return Err(traversal());
    }

    let unified = relative.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(traversal());
    }

    // Reject drive letters and other platform prefixes.
    if Path::new(&unified)
        .components()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(traversal());
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            s => segments.push(s),
        }
    }

    if segments.is_empty() && policy == RootPolicy::Deny {
        return Err(traversal());
    }

    Ok(segments.join("/"))
}

/// Returns true if any segment of a normalised relative path starts with `.`.
pub fn is_hidden(relative: &str) -> bool {
    relative.split('/').any(|segment| segment.starts_with('.'))
}
