//! # Workspace Index
//!
//! Derives workspace manifests from the directory tree on demand.
//!
//! A workspace is a directory directly under the configured workspaces root; its existence
//! *is* the existence of the workspace. External job runners add and remove files at any
//! time, so listings are never cached. Only per-file content hashes are cached, keyed by
//! path, size and modification time (see [`HashCache`]).

use crate::config::CoreConfig;
use crate::constants::EXCLUDED_WORKSPACE_DIRS;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use hatch_files::{is_hidden, list_files, FilesError, HashCache, PathGuard};
use hatch_types::WorkspaceName;
use serde::Serialize;
use std::sync::Arc;

/// One file in a workspace manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkspaceFile {
    /// Forward-slash path relative to the workspace root.
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub sha256: String,
}

/// Returns true if `relative` may appear in a workspace manifest.
///
/// Hidden entries (any segment starting with `.`) and the top-level `releases/` and
/// `metadata/` directories are excluded. The same rule decides what can be selected into a
/// release or streamed.
pub fn is_workspace_visible(relative: &str) -> bool {
    let top = relative.split('/').next().unwrap_or_default();
    !relative.is_empty() && !is_hidden(relative) && !EXCLUDED_WORKSPACE_DIRS.contains(&top)
}

/// Read-only view over the workspaces root.
#[derive(Debug)]
pub struct WorkspaceIndex {
    cfg: Arc<CoreConfig>,
    hashes: Arc<HashCache>,
}

impl WorkspaceIndex {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_hash_cache(cfg, Arc::new(HashCache::default()))
    }

    pub fn with_hash_cache(cfg: Arc<CoreConfig>, hashes: Arc<HashCache>) -> Self {
        Self { cfg, hashes }
    }

    /// Returns a guard rooted at the workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkspaceNotFound`] if no such directory exists (including a
    /// workspace name that resolves, via symlink, outside the workspaces root).
    pub fn guard(&self, workspace: &WorkspaceName) -> CoreResult<PathGuard> {
        let not_found = || CoreError::WorkspaceNotFound(workspace.to_string());

        let root = PathGuard::new(self.cfg.workspaces_dir())?;
        let resolved = match root.resolve(workspace.as_str()) {
            Ok(resolved) => resolved,
            Err(FilesError::NotFound(_)) | Err(FilesError::PathTraversal(_)) => {
                return Err(not_found())
            }
            Err(e) => return Err(e.into()),
        };

        match PathGuard::new(&resolved.absolute) {
            Ok(guard) => Ok(guard),
            Err(FilesError::InvalidRootDirectory(_)) => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every visible file in the workspace, sorted by path.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WorkspaceNotFound`] if the workspace directory does not exist
    /// - [`CoreError::Io`] if the directory cannot be walked or a file cannot be hashed
    pub fn list(&self, workspace: &WorkspaceName) -> CoreResult<Vec<WorkspaceFile>> {
        let guard = self.guard(workspace)?;
        let entries = list_files(&guard, is_workspace_visible)?;

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let sha256 = match self.hashes.sha256(&entry.absolute) {
                Ok(sha) => sha,
                // Removed by an external writer since the walk.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            files.push(WorkspaceFile {
                path: entry.relative,
                size: entry.size,
                modified: entry.modified,
                sha256,
            });
        }

        Ok(files)
    }

    /// Looks up a single visible file.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WorkspaceNotFound`] if the workspace directory does not exist
    /// - [`CoreError::PathTraversal`] if `relative` escapes the workspace
    /// - [`CoreError::FileNotFound`] if it does not name a visible regular file
    pub fn stat(&self, workspace: &WorkspaceName, relative: &str) -> CoreResult<WorkspaceFile> {
        let guard = self.guard(workspace)?;
        let resolved = guard.resolve(relative)?;
        let not_found = || CoreError::FileNotFound(resolved.relative.clone());

        if !is_workspace_visible(&resolved.relative) {
            return Err(not_found());
        }

        let metadata = match std::fs::metadata(&resolved.absolute) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let sha256 = self.hashes.sha256(&resolved.absolute)?;

        Ok(WorkspaceFile {
            path: resolved.relative.clone(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
            sha256,
        })
    }
}
