//! # Release Store
//!
//! Releases are immutable snapshots of selected workspace files. Each one lives in its own
//! directory under the releases root:
//!
//! ```text
//! <releases_dir>/<release_id>/release.json
//! <releases_dir>/<release_id>/files/<relative path>...
//! ```
//!
//! There is no database. Consistency comes from two rules:
//!
//! - Every multi-step mutation is staged and then atomically renamed into place. A release is
//!   assembled in a hidden `.tmp-*` sibling directory and renamed to its final name only once
//!   every file is copied and the metadata written; metadata updates write a hidden temporary
//!   file and rename it over `release.json`.
//! - Writers to one release are serialised by an in-memory lock keyed by release id.
//!   Different releases never contend.
//!
//! Readers take no lock: they only ever observe complete directories and complete files.

use crate::constants::{
    MAX_RELEASE_ID_ATTEMPTS, RELEASE_FILES_DIR_NAME, RELEASE_METADATA_FILENAME, TEMP_PREFIX,
};
use crate::workspaces::{WorkspaceFile, WorkspaceIndex};
use crate::{CoreConfig, CoreError, CoreResult};
use chrono::{DateTime, Utc};
use hatch_files::{sha256_file, PathGuard};
use hatch_types::{ReleaseId, WorkspaceName};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upload status of one file in a release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploaded,
    Failed { reason: String },
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Failed { .. } => "failed",
        }
    }

    /// Legal transitions: `pending → uploaded`, `pending → failed`, and `failed → pending`
    /// when a failed file is retried.
    pub fn can_transition_to(&self, next: &FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Uploaded)
                | (FileStatus::Pending, FileStatus::Failed { .. })
                | (FileStatus::Failed { .. }, FileStatus::Pending)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

/// A reviewer's decision on one released file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub status: ReviewStatus,
    #[serde(default)]
    pub comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// One file captured in a release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub path: String,
    pub size: u64,
    /// Modification time of the workspace file when it was captured.
    pub modified: DateTime<Utc>,
    /// Hash of the captured copy.
    pub sha256: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The persisted record of a release (`release.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub workspace: WorkspaceName,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    /// Paths exactly as requested, before normalisation.
    pub requested_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Captured files, sorted by path.
    pub files: Vec<ReleaseFile>,
}

/// Aggregate upload status, derived from the per-file statuses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub pending: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub complete: bool,
}

impl Release {
    pub fn file(&self, path: &str) -> Option<&ReleaseFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// True once every file is uploaded.
    pub fn is_complete(&self) -> bool {
        !self.files.is_empty() && self.files.iter().all(|f| f.status == FileStatus::Uploaded)
    }

    pub fn summary(&self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        for file in &self.files {
            match file.status {
                FileStatus::Pending => summary.pending += 1,
                FileStatus::Uploaded => summary.uploaded += 1,
                FileStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary.complete = self.is_complete();
        summary
    }
}

/// A file requested for release.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedFile {
    pub path: String,
    /// Hash the reviewer saw. Creation fails if the captured copy differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A request to snapshot workspace files into a new release.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub files: Vec<RequestedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ReleaseRequest {
    /// A request for plain paths with no expected hashes or metadata.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: paths
                .into_iter()
                .map(|p| RequestedFile {
                    path: p.into(),
                    ..RequestedFile::default()
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// Creates, reads and updates releases under the configured releases root.
#[derive(Debug)]
pub struct ReleaseStore {
    cfg: Arc<CoreConfig>,
    index: Arc<WorkspaceIndex>,
    locks: Mutex<HashMap<ReleaseId, Arc<Mutex<()>>>>,
}

impl ReleaseStore {
    pub fn new(cfg: Arc<CoreConfig>, index: Arc<WorkspaceIndex>) -> Self {
        Self {
            cfg,
            index,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` while holding the release's writer lock. The lock entry is dropped from the
    /// map once no other writer holds or waits on it.
    fn locked<T>(&self, id: ReleaseId, f: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        let lock = self.locks.lock().entry(id).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // One reference in the map plus ours: nobody else is queued on it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        result
    }

    fn release_dir(&self, id: ReleaseId) -> PathBuf {
        self.cfg.releases_dir().join(id.to_string())
    }

    /// Snapshots the requested workspace files into a new release.
    ///
    /// Every path is validated against the workspace first. Files are then copied into a
    /// hidden staging directory, hashed, checked against any expected hash, and the staging
    /// directory is renamed into place. A concurrent [`list`](Self::list) therefore sees
    /// either no release or the complete one.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WorkspaceNotFound`] if the workspace does not exist
    /// - [`CoreError::EmptySelection`] if no files are requested
    /// - [`CoreError::PathTraversal`] / [`CoreError::FileNotFound`] for an invalid path
    /// - [`CoreError::FileChanged`] if a captured file does not match its expected hash
    /// - [`CoreError::ReleaseCreationFailed`] for filesystem failures while staging
    /// - [`CoreError::CleanupAfterCreateFailed`] if the staging directory could not be removed
    ///   after any of the above
    pub fn create(&self, workspace: &WorkspaceName, request: &ReleaseRequest) -> CoreResult<Release> {
        let workspace_guard = self.index.guard(workspace)?;
        if request.files.is_empty() {
            return Err(CoreError::EmptySelection);
        }

        // Validate and collapse duplicates; BTreeMap keeps the captured files in path order.
        let mut selected = BTreeMap::new();
        for requested in &request.files {
            let file = self.index.stat(workspace, &requested.path)?;
            selected.entry(file.path.clone()).or_insert((file, requested));
        }

        let id = self.unused_release_id()?;
        self.locked(id, || self.stage(id, workspace, request, &workspace_guard, &selected))
    }

    fn stage(
        &self,
        id: ReleaseId,
        workspace: &WorkspaceName,
        request: &ReleaseRequest,
        workspace_guard: &PathGuard,
        selected: &BTreeMap<String, (WorkspaceFile, &RequestedFile)>,
    ) -> CoreResult<Release> {
        let staging = self
            .cfg
            .releases_dir()
            .join(format!("{TEMP_PREFIX}{id}"));
        let final_dir = self.release_dir(id);

        let result: CoreResult<Release> = (|| {
            fs::create_dir(&staging).map_err(CoreError::ReleaseCreationFailed)?;
            let files_dir = staging.join(RELEASE_FILES_DIR_NAME);
            fs::create_dir(&files_dir).map_err(CoreError::ReleaseCreationFailed)?;
            let files_guard = PathGuard::new(&files_dir)?;

            let mut files = Vec::with_capacity(selected.len());
            for (path, (file, requested)) in selected {
                let source = workspace_guard.resolve(path)?;
                let dest = files_guard.join(path)?;
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(CoreError::ReleaseCreationFailed)?;
                }
                let size = fs::copy(&source.absolute, &dest).map_err(|e| {
                    if e.kind() == ErrorKind::NotFound {
                        CoreError::FileNotFound(path.clone())
                    } else {
                        CoreError::ReleaseCreationFailed(e)
                    }
                })?;
                let sha256 = sha256_file(&dest).map_err(CoreError::ReleaseCreationFailed)?;

                if let Some(expected) = &requested.sha256 {
                    if !expected.eq_ignore_ascii_case(&sha256) {
                        return Err(CoreError::FileChanged {
                            path: path.clone(),
                            expected: expected.clone(),
                            actual: sha256,
                        });
                    }
                }

                files.push(ReleaseFile {
                    path: path.clone(),
                    size,
                    modified: file.modified,
                    sha256,
                    status: FileStatus::Pending,
                    review: None,
                    metadata: requested.metadata.clone(),
                });
            }

            let release = Release {
                id,
                workspace: workspace.clone(),
                created_at: Utc::now(),
                requested_by: request.requested_by.clone(),
                requested_files: request.files.iter().map(|f| f.path.clone()).collect(),
                metadata: request.metadata.clone(),
                files,
            };

            write_json(&staging.join(RELEASE_METADATA_FILENAME), &release)
                .map_err(|e| match e {
                    CoreError::MetadataWrite(io) => CoreError::ReleaseCreationFailed(io),
                    other => other,
                })?;
            fs::rename(&staging, &final_dir).map_err(CoreError::ReleaseCreationFailed)?;

            Ok(release)
        })();

        match result {
            Ok(release) => {
                tracing::info!(
                    "created release {} in workspace {} with {} file(s)",
                    release.id,
                    release.workspace,
                    release.files.len()
                );
                Ok(release)
            }
            Err(create_error) => {
                match fs::remove_dir_all(&staging) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(cleanup_error) => {
                        return Err(CoreError::CleanupAfterCreateFailed {
                            path: staging,
                            create_error: Box::new(create_error),
                            cleanup_error,
                        });
                    }
                }
                Err(create_error)
            }
        }
    }

    fn unused_release_id(&self) -> CoreResult<ReleaseId> {
        for _ in 0..MAX_RELEASE_ID_ATTEMPTS {
            let id = ReleaseId::new();
            if !self.release_dir(id).exists() {
                return Ok(id);
            }
        }
        Err(CoreError::ReleaseCreationFailed(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique release id",
        )))
    }

    /// Reads a release by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReleaseNotFound`] if no such release exists.
    pub fn get(&self, id: ReleaseId) -> CoreResult<Release> {
        let path = self.release_dir(id).join(RELEASE_METADATA_FILENAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::ReleaseNotFound(id.to_string()))
            }
            Err(e) => return Err(CoreError::MetadataRead(e)),
        };
        serde_json::from_str(&contents).map_err(CoreError::Deserialization)
    }

    /// Reads a release, treating one that belongs to another workspace as not found.
    pub fn get_in_workspace(&self, workspace: &WorkspaceName, id: ReleaseId) -> CoreResult<Release> {
        let release = self.get(id)?;
        if &release.workspace != workspace {
            return Err(CoreError::ReleaseNotFound(id.to_string()));
        }
        Ok(release)
    }

    /// Lists the workspace's releases, oldest first.
    ///
    /// Staging directories and anything that is not a release directory are skipped, as are
    /// releases whose metadata cannot be read (logged at `warn`).
    pub fn list(&self, workspace: &WorkspaceName) -> CoreResult<Vec<Release>> {
        let mut releases = Vec::new();

        for entry in fs::read_dir(self.cfg.releases_dir())? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| ReleaseId::parse(name).ok())
            else {
                continue;
            };

            match self.get(id) {
                Ok(release) if &release.workspace == workspace => releases.push(release),
                Ok(_) | Err(CoreError::ReleaseNotFound(_)) => {}
                Err(e) => tracing::warn!("skipping unreadable release {}: {}", id, e),
            }
        }

        releases.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(releases)
    }

    /// Returns a guard rooted at the release's snapshot directory.
    pub fn files_guard(&self, id: ReleaseId) -> CoreResult<PathGuard> {
        let dir = self.release_dir(id).join(RELEASE_FILES_DIR_NAME);
        if !dir.is_dir() {
            return Err(CoreError::ReleaseNotFound(id.to_string()));
        }
        Ok(PathGuard::new(&dir)?)
    }

    /// Moves one file to `status`, rewriting the metadata atomically.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReleaseNotFound`] / [`CoreError::FileNotFound`] if either is unknown
    /// - [`CoreError::InvalidStatusTransition`] if the move is not a legal transition
    pub fn update_status(
        &self,
        id: ReleaseId,
        path: &str,
        status: FileStatus,
    ) -> CoreResult<Release> {
        self.mutate(id, path, |file| {
            if !file.status.can_transition_to(&status) {
                return Err(CoreError::InvalidStatusTransition {
                    path: file.path.clone(),
                    from: file.status.label(),
                    to: status.label(),
                });
            }
            tracing::debug!(
                "release {}: {} {} -> {}",
                id,
                file.path,
                file.status.label(),
                status.label()
            );
            file.status = status;
            Ok(())
        })
    }

    /// Records reviewer decisions for several files in one metadata rewrite. Upload status is
    /// unaffected.
    ///
    /// Either every review is stored or none is.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReleaseNotFound`] if the release is unknown
    /// - [`CoreError::FileNotFound`] if any path is not part of the release
    pub fn record_reviews(
        &self,
        id: ReleaseId,
        reviews: Vec<(String, Review)>,
    ) -> CoreResult<Release> {
        self.mutate_release(id, |release| {
            if let Some((missing, _)) = reviews.iter().find(|(path, _)| release.file(path).is_none())
            {
                return Err(CoreError::FileNotFound(missing.clone()));
            }
            for (path, review) in reviews {
                if let Some(file) = release.files.iter_mut().find(|f| f.path == path) {
                    file.review = Some(review);
                }
            }
            Ok(())
        })
    }

    fn mutate(
        &self,
        id: ReleaseId,
        path: &str,
        change: impl FnOnce(&mut ReleaseFile) -> CoreResult<()>,
    ) -> CoreResult<Release> {
        self.mutate_release(id, |release| {
            let file = release
                .files
                .iter_mut()
                .find(|f| f.path == path)
                .ok_or_else(|| CoreError::FileNotFound(path.to_string()))?;
            change(file)
        })
    }

    /// Re-reads the metadata under the release lock, applies `change` and rewrites it. Nothing
    /// is written if `change` fails.
    fn mutate_release(
        &self,
        id: ReleaseId,
        change: impl FnOnce(&mut Release) -> CoreResult<()>,
    ) -> CoreResult<Release> {
        self.locked(id, || {
            let mut release = self.get(id)?;
            change(&mut release)?;
            write_json(
                &self.release_dir(id).join(RELEASE_METADATA_FILENAME),
                &release,
            )?;
            Ok(release)
        })
    }
}

/// Writes `value` as JSON to a hidden temporary sibling of `path`, then renames it over
/// `path`.
fn write_json<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let contents = serde_json::to_vec_pretty(value).map_err(CoreError::Serialization)?;

    let parent = path
        .parent()
        .ok_or_else(|| CoreError::InvalidInput(format!("no parent: {}", path.display())))?;
    let temp = parent.join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(CoreError::MetadataWrite(e));
    }
    Ok(())
}
