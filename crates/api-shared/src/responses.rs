//! Request and response bodies for the hatch HTTP API.
//!
//! File listings use the `FileList` shape the release SPA already consumes: each file has a
//! `name`, `url`, `size`, `sha256` and `date`, plus optional user metadata and review.

use chrono::{DateTime, Utc};
use hatch_core::{
    FileStatus, Release, ReleaseFile, ReleaseRequest, ReleaseSummary, RequestedFile, Review,
    ReviewStatus, UploadOutcome, UploadReport, WorkspaceFile,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileReviewStatus {
    Approved,
    Rejected,
}

impl From<ReviewStatus> for FileReviewStatus {
    fn from(status: ReviewStatus) -> Self {
        match status {
            ReviewStatus::Approved => FileReviewStatus::Approved,
            ReviewStatus::Rejected => FileReviewStatus::Rejected,
        }
    }
}

impl From<FileReviewStatus> for ReviewStatus {
    fn from(status: FileReviewStatus) -> Self {
        match status {
            FileReviewStatus::Approved => ReviewStatus::Approved,
            FileReviewStatus::Rejected => ReviewStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileReviewRes {
    pub status: FileReviewStatus,
    #[serde(default)]
    pub comments: String,
}

/// One file in a workspace or release listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileMetadataRes {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub size: u64,
    pub sha256: String,
    #[schema(value_type = String, format = DateTime)]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<FileReviewRes>,
    /// Upload status (`pending`, `uploaded`, `failed`); release files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Failure reason when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FileMetadataRes {
    pub fn from_workspace_file(file: &WorkspaceFile, url: Option<String>) -> Self {
        Self {
            name: file.path.clone(),
            url,
            size: file.size,
            sha256: file.sha256.clone(),
            date: file.modified,
            metadata: None,
            review: None,
            status: None,
            reason: None,
        }
    }

    pub fn from_release_file(file: &ReleaseFile, url: Option<String>) -> Self {
        let reason = match &file.status {
            FileStatus::Failed { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            name: file.path.clone(),
            url,
            size: file.size,
            sha256: file.sha256.clone(),
            date: file.modified,
            metadata: file.metadata.clone(),
            review: file.review.as_ref().map(|r| FileReviewRes {
                status: r.status.into(),
                comments: r.comments.clone(),
            }),
            status: Some(file.status.label().to_string()),
            reason,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReleaseSummaryRes {
    pub pending: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub complete: bool,
}

impl From<ReleaseSummary> for ReleaseSummaryRes {
    fn from(s: ReleaseSummary) -> Self {
        Self {
            pending: s.pending,
            uploaded: s.uploaded,
            failed: s.failed,
            complete: s.complete,
        }
    }
}

/// A workspace or release manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileListRes {
    pub files: Vec<FileMetadataRes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    /// Aggregate upload status; release manifests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReleaseSummaryRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReleaseRes {
    pub id: String,
    pub workspace: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    pub files: usize,
    pub summary: ReleaseSummaryRes,
}

impl From<&Release> for ReleaseRes {
    fn from(release: &Release) -> Self {
        Self {
            id: release.id.to_string(),
            workspace: release.workspace.to_string(),
            created_at: release.created_at,
            requested_by: release.requested_by.clone(),
            files: release.files.len(),
            summary: release.summary().into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReleaseListRes {
    pub releases: Vec<ReleaseRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileMetadataReq {
    pub name: String,
    /// Hash the requester reviewed.
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

/// Files to release, either as `{name: sha256}` or as a file list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ReleaseFilesReq {
    Hashes(BTreeMap<String, String>),
    Files(Vec<FileMetadataReq>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateReleaseReq {
    pub files: ReleaseFilesReq,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl CreateReleaseReq {
    /// Converts into a core request made by `requested_by`.
    pub fn into_release_request(self, requested_by: &str) -> ReleaseRequest {
        let files = match self.files {
            ReleaseFilesReq::Hashes(hashes) => hashes
                .into_iter()
                .map(|(path, sha256)| RequestedFile {
                    path,
                    sha256: Some(sha256),
                    metadata: None,
                })
                .collect(),
            ReleaseFilesReq::Files(files) => files
                .into_iter()
                .map(|f| RequestedFile {
                    path: f.name,
                    sha256: f.sha256,
                    metadata: f.metadata,
                })
                .collect(),
        };

        ReleaseRequest {
            files,
            requested_by: Some(requested_by.to_string()),
            metadata: self.metadata,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateReleaseRes {
    pub release_id: String,
    pub release: FileListRes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileReviewReq {
    pub name: String,
    pub review: FileReviewRes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewsReq {
    pub files: Vec<FileReviewReq>,
}

impl FileReviewReq {
    pub fn into_review(self, reviewer: &str, at: DateTime<Utc>) -> (String, Review) {
        (
            self.name,
            Review {
                status: self.review.status.into(),
                comments: self.review.comments,
                reviewer: Some(reviewer.to_string()),
                reviewed_at: at,
            },
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadOutcomeRes {
    pub name: String,
    /// `uploaded`, `already_uploaded` or `failed`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadReportRes {
    pub release_id: String,
    pub files: Vec<UploadOutcomeRes>,
    pub summary: ReleaseSummaryRes,
}

impl From<&UploadReport> for UploadReportRes {
    fn from(report: &UploadReport) -> Self {
        let files = report
            .files
            .iter()
            .map(|f| {
                let (outcome, attempts, reason) = match &f.outcome {
                    UploadOutcome::Uploaded { attempts } => ("uploaded", Some(*attempts), None),
                    UploadOutcome::AlreadyUploaded => ("already_uploaded", None, None),
                    UploadOutcome::Failed { attempts, reason } => {
                        ("failed", Some(*attempts), Some(reason.clone()))
                    }
                };
                UploadOutcomeRes {
                    name: f.path.clone(),
                    outcome: outcome.to_string(),
                    attempts,
                    reason,
                }
            })
            .collect();

        Self {
            release_id: report.release_id.to_string(),
            files,
            summary: report.summary.into(),
        }
    }
}
