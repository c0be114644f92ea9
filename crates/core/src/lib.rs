//! # Hatch Core
//!
//! Directory-derived state for workspaces and releases.
//!
//! This crate contains the file-backed operations of the service:
//! - Workspace manifests derived on demand from the workspaces root
//! - Release snapshots, their metadata and per-file status under the releases root
//! - Range-aware file streaming from either tree
//! - Uploading released files to job-server
//!
//! **No API concerns**: token checks, HTTP routing and response shapes belong in
//! `api-shared` and `api-rest`.

pub mod config;
pub mod constants;
pub mod error;
pub mod releases;
pub mod serve;
mod task;
pub mod upload;
pub mod workspaces;

pub use config::{parse_status_list, upload_policy_from_env_values, CoreConfig, UploadPolicy};
pub use error::{CoreError, CoreResult};
pub use releases::{
    FileStatus, Release, ReleaseFile, ReleaseRequest, ReleaseStore, ReleaseSummary,
    RequestedFile, Review, ReviewStatus,
};
pub use serve::{FileServer, StreamScope};
pub use upload::{
    FileOutcome, JobServer, JobServerClient, ReviewRequest, UploadOutcome, UploadPipeline,
    UploadReport, UploadRequest,
};
pub use workspaces::{is_workspace_visible, WorkspaceFile, WorkspaceIndex};

// Re-exported so callers do not need direct dependencies for types in this crate's API.
pub use hatch_files::{ByteRange, FileStream};
pub use hatch_tokens::{AuthContext, SigningSecret, TokenCodec, TokenScope};
pub use hatch_types::{ReleaseId, WorkspaceName};
