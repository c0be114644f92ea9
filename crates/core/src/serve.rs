//! # File Server
//!
//! Streams workspace or release files. Paths go through the relevant [`PathGuard`] and the
//! bytes are read in bounded chunks, so memory use does not depend on file size. No release
//! lock is held while streaming.
//!
//! [`PathGuard`]: hatch_files::PathGuard

use crate::releases::ReleaseStore;
use crate::task::run_blocking;
use crate::workspaces::{is_workspace_visible, WorkspaceIndex};
use crate::{CoreError, CoreResult};
use hatch_files::{open_stream, ByteRange, FileStream, FilesError};
use hatch_types::{ReleaseId, WorkspaceName};
use std::sync::Arc;

/// Which tree a file is served from.
#[derive(Clone, Copy, Debug)]
pub enum StreamScope<'a> {
    /// The live workspace directory.
    Workspace(&'a WorkspaceName),
    /// A release snapshot. The release must belong to the workspace.
    Release(&'a WorkspaceName, ReleaseId),
}

#[derive(Clone, Debug)]
pub struct FileServer {
    index: Arc<WorkspaceIndex>,
    releases: Arc<ReleaseStore>,
}

impl FileServer {
    pub fn new(index: Arc<WorkspaceIndex>, releases: Arc<ReleaseStore>) -> Self {
        Self { index, releases }
    }

    /// Opens `relative` within `scope`, optionally restricted to `range`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WorkspaceNotFound`] / [`CoreError::ReleaseNotFound`] for an unknown scope
    /// - [`CoreError::PathTraversal`] if the path escapes the scope's root
    /// - [`CoreError::FileNotFound`] if the path does not name a servable file
    /// - [`CoreError::RangeNotSatisfiable`] if the range lies outside the file
    pub async fn stream(
        &self,
        scope: StreamScope<'_>,
        relative: &str,
        range: Option<ByteRange>,
    ) -> CoreResult<FileStream> {
        let relative = relative.to_owned();
        let resolved = match scope {
            StreamScope::Workspace(workspace) => {
                let (index, workspace) = (self.index.clone(), workspace.clone());
                run_blocking(move || {
                    let resolved = index.guard(&workspace)?.resolve(&relative)?;
                    if !is_workspace_visible(&resolved.relative) {
                        return Err(CoreError::FileNotFound(resolved.relative));
                    }
                    Ok(resolved)
                })
                .await?
            }
            StreamScope::Release(workspace, id) => {
                let (releases, workspace) = (self.releases.clone(), workspace.clone());
                run_blocking(move || {
                    releases.get_in_workspace(&workspace, id)?;
                    Ok(releases.files_guard(id)?.resolve(&relative)?)
                })
                .await?
            }
        };

        tracing::debug!("streaming {} ({:?})", resolved.relative, range);
        open_stream(&resolved.absolute, range)
            .await
            .map_err(|e| match e {
                // Report the caller's path, never the server-side location.
                FilesError::NotFound(_) => CoreError::FileNotFound(resolved.relative.clone()),
                other => other.into(),
            })
    }
}
