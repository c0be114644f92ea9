//! # Upload Pipeline
//!
//! Pushes a release's files to job-server one at a time, in path order, and forwards
//! reviewer decisions.
//!
//! Per-file outcomes are data: a file that exhausts its retries, or whose release copy cannot
//! be read, is recorded as `failed(reason)` and the batch moves on. Re-running an upload only
//! touches files that are not yet `uploaded`, moving `failed` files back to `pending` first.

use crate::config::{CoreConfig, UploadPolicy};
use crate::constants::{
    MAX_ERROR_BODY_LEN, UPLOAD_CONNECT_TIMEOUT, UPLOAD_REQUEST_TIMEOUT, UPLOAD_TOKEN_TTL_SECS,
};
use crate::releases::{FileStatus, Release, ReleaseStore, ReleaseSummary, Review, ReviewStatus};
use crate::task::run_blocking;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use hatch_files::STREAM_CHUNK_SIZE;
use hatch_tokens::{TokenCodec, TokenScope};
use hatch_types::{ReleaseId, WorkspaceName};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// One file to deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    pub workspace: WorkspaceName,
    pub release_id: ReleaseId,
    /// Path within the release.
    pub path: String,
    /// Location of the release's copy on disk.
    pub absolute: PathBuf,
    pub size: u64,
    pub sha256: String,
    /// User the upload is made on behalf of.
    pub user: String,
}

/// Reviewer decisions on files of one release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewRequest {
    pub workspace: WorkspaceName,
    pub release_id: ReleaseId,
    /// `(path, review)` pairs, applied together.
    pub reviews: Vec<(String, Review)>,
    pub user: String,
}

/// Talks to job-server.
///
/// Implementations report retryable failures as [`CoreError::UploadTransientError`] and
/// everything else as [`CoreError::UploadFatalError`].
#[async_trait]
pub trait JobServer: Send + Sync {
    /// Delivers a single file.
    async fn upload(&self, request: &UploadRequest) -> CoreResult<()>;

    /// Forwards reviews of released files.
    async fn upload_reviews(&self, request: &ReviewRequest) -> CoreResult<()>;
}

/// HTTP client for job-server's release endpoints.
#[derive(Clone, Debug)]
pub struct JobServerClient {
    http: reqwest::Client,
    endpoint: String,
    codec: TokenCodec,
    policy: UploadPolicy,
}

#[derive(Serialize)]
struct ReviewPayload<'a> {
    files: Vec<ReviewedFile<'a>>,
}

#[derive(Serialize)]
struct ReviewedFile<'a> {
    name: &'a str,
    review: ReviewDecision<'a>,
}

#[derive(Serialize)]
struct ReviewDecision<'a> {
    status: &'static str,
    comments: &'a str,
}

fn review_payload(reviews: &[(String, Review)]) -> ReviewPayload<'_> {
    ReviewPayload {
        files: reviews
            .iter()
            .map(|(path, review)| ReviewedFile {
                name: path,
                review: ReviewDecision {
                    status: match review.status {
                        ReviewStatus::Approved => "APPROVED",
                        ReviewStatus::Rejected => "REJECTED",
                    },
                    comments: &review.comments,
                },
            })
            .collect(),
    }
}

fn send_error(e: reqwest::Error) -> CoreError {
    if e.is_timeout() || e.is_connect() {
        CoreError::UploadTransientError(e.to_string())
    } else {
        CoreError::UploadFatalError(e.to_string())
    }
}

impl JobServerClient {
    pub fn new(cfg: &CoreConfig) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(UPLOAD_CONNECT_TIMEOUT)
            .timeout(UPLOAD_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: cfg.job_server_endpoint().to_string(),
            codec: cfg.token_codec().clone(),
            policy: cfg.upload_policy().clone(),
        })
    }

    fn url(&self, release_id: ReleaseId) -> String {
        format!("{}/releases/release/{}", self.endpoint, release_id)
    }

    fn reviews_url(&self, release_id: ReleaseId) -> String {
        format!("{}/reviews", self.url(release_id))
    }

    fn token(&self, workspace: &WorkspaceName, release_id: ReleaseId, user: &str) -> CoreResult<String> {
        Ok(self.codec.issue(
            workspace,
            Some(release_id),
            TokenScope::Upload,
            user,
            chrono::Duration::seconds(UPLOAD_TOKEN_TTL_SECS),
        )?)
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: &str) -> CoreError {
        let message = format!(
            "job-server returned {}: {}",
            status.as_u16(),
            truncate(body.trim(), MAX_ERROR_BODY_LEN)
        );
        if self.policy.is_retryable_status(status.as_u16()) {
            CoreError::UploadTransientError(message)
        } else {
            CoreError::UploadFatalError(message)
        }
    }

    async fn check(&self, response: reqwest::Response) -> CoreResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.classify_status(status, &body))
    }
}

#[async_trait]
impl JobServer for JobServerClient {
    async fn upload(&self, request: &UploadRequest) -> CoreResult<()> {
        let token = self.token(&request.workspace, request.release_id, &request.user)?;

        let file = tokio::fs::File::open(&request.absolute)
            .await
            .map_err(|e| CoreError::UploadFatalError(format!("cannot open {}: {e}", request.path)))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE));

        let response = self
            .http
            .post(self.url(request.release_id))
            .header(reqwest::header::AUTHORIZATION, token)
            .header("OS-User", &request.user)
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", request.path.replace('"', "\\\"")),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, request.size)
            .body(body)
            .send()
            .await
            .map_err(send_error)?;

        self.check(response).await
    }

    async fn upload_reviews(&self, request: &ReviewRequest) -> CoreResult<()> {
        let token = self.token(&request.workspace, request.release_id, &request.user)?;
        let body = serde_json::to_vec(&review_payload(&request.reviews))
            .map_err(CoreError::Serialization)?;

        let response = self
            .http
            .post(self.reviews_url(request.release_id))
            .header(reqwest::header::AUTHORIZATION, token)
            .header("OS-User", &request.user)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(send_error)?;

        self.check(response).await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// What happened to one file during an upload run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded { attempts: u32 },
    AlreadyUploaded,
    Failed { attempts: u32, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// Result of one upload run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub release_id: ReleaseId,
    pub files: Vec<FileOutcome>,
    /// Recomputed from the stored per-file statuses after the run.
    pub summary: ReleaseSummary,
}

type Gates = Mutex<HashMap<ReleaseId, Arc<tokio::sync::Mutex<()>>>>;

/// A release's entry in the in-flight map. Dropping it removes the entry once no other run
/// holds or awaits the same gate.
struct GateEntry<'a> {
    gates: &'a Gates,
    release_id: ReleaseId,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> GateEntry<'a> {
    fn acquire(gates: &'a Gates, release_id: ReleaseId) -> Self {
        let gate = gates.lock().entry(release_id).or_default().clone();
        Self {
            gates,
            release_id,
            gate,
        }
    }
}

impl Drop for GateEntry<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // The map's reference plus ours.
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.release_id);
        }
    }
}

/// Runs uploads: one outbound call at a time per release, releases independent of each other.
pub struct UploadPipeline {
    releases: Arc<ReleaseStore>,
    job_server: Arc<dyn JobServer>,
    policy: UploadPolicy,
    in_flight: Gates,
}

impl std::fmt::Debug for UploadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl UploadPipeline {
    pub fn new(
        releases: Arc<ReleaseStore>,
        job_server: Arc<dyn JobServer>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            releases,
            job_server,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Uploads every file of the release that is not yet `uploaded`, on behalf of `user`.
    ///
    /// Concurrent calls for the same release queue behind each other.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReleaseNotFound`] for an unknown release, or a metadata error if
    /// a status cannot be recorded. Delivery failures are reported per file, not as errors.
    pub async fn upload(&self, release_id: ReleaseId, user: &str) -> CoreResult<UploadReport> {
        let entry = GateEntry::acquire(&self.in_flight, release_id);
        let _running = entry.gate.lock().await;

        let releases = self.releases.clone();
        let (release, files_guard) = run_blocking(move || {
            Ok((releases.get(release_id)?, releases.files_guard(release_id)?))
        })
        .await?;
        let mut outcomes = Vec::with_capacity(release.files.len());

        for file in &release.files {
            if file.status == FileStatus::Uploaded {
                outcomes.push(FileOutcome {
                    path: file.path.clone(),
                    outcome: UploadOutcome::AlreadyUploaded,
                });
                continue;
            }

            let releases = self.releases.clone();
            let guard = files_guard.clone();
            let path = file.path.clone();
            let retry = matches!(file.status, FileStatus::Failed { .. });
            let located = run_blocking(move || {
                if retry {
                    releases.update_status(release_id, &path, FileStatus::Pending)?;
                }
                Ok(guard.resolve(&path))
            })
            .await?;

            let outcome = match located {
                Ok(resolved) => {
                    let request = UploadRequest {
                        workspace: release.workspace.clone(),
                        release_id,
                        path: file.path.clone(),
                        absolute: resolved.absolute,
                        size: file.size,
                        sha256: file.sha256.clone(),
                        user: user.to_string(),
                    };
                    let (result, attempts) = self.deliver(&request).await;
                    match result {
                        Ok(()) => {
                            self.set_status(release_id, &file.path, FileStatus::Uploaded)
                                .await?;
                            UploadOutcome::Uploaded { attempts }
                        }
                        Err(e) => self.record_failure(release_id, &file.path, attempts, e).await?,
                    }
                }
                Err(e) => {
                    let e = CoreError::from(e);
                    self.record_failure(release_id, &file.path, 0, e).await?
                }
            };
            outcomes.push(FileOutcome {
                path: file.path.clone(),
                outcome,
            });
        }

        let releases = self.releases.clone();
        let summary = run_blocking(move || releases.get(release_id)).await?.summary();
        tracing::info!(
            "release {}: upload finished ({} uploaded, {} failed, {} pending)",
            release_id,
            summary.uploaded,
            summary.failed,
            summary.pending
        );

        Ok(UploadReport {
            release_id,
            files: outcomes,
            summary,
        })
    }

    /// Stores the reviews, all or none, then forwards them to job-server.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileNotFound`] if any path is not part of the release, in which
    /// case nothing is stored or forwarded. A forwarding failure is returned after the local
    /// write; re-submitting the same reviews is safe.
    pub async fn submit_reviews(&self, request: ReviewRequest) -> CoreResult<Release> {
        let releases = self.releases.clone();
        let (release_id, reviews) = (request.release_id, request.reviews.clone());
        let release = run_blocking(move || releases.record_reviews(release_id, reviews)).await?;

        let (result, attempts) = self
            .with_retries("reviews", || self.job_server.upload_reviews(&request))
            .await;
        if let Err(e) = result {
            tracing::warn!(
                "release {}: forwarding reviews failed after {} attempt(s): {}",
                release_id,
                attempts,
                e
            );
            return Err(e);
        }
        Ok(release)
    }

    async fn set_status(&self, id: ReleaseId, path: &str, status: FileStatus) -> CoreResult<()> {
        let releases = self.releases.clone();
        let path = path.to_owned();
        run_blocking(move || releases.update_status(id, &path, status).map(drop)).await
    }

    async fn record_failure(
        &self,
        id: ReleaseId,
        path: &str,
        attempts: u32,
        error: CoreError,
    ) -> CoreResult<UploadOutcome> {
        let reason = error.to_string();
        tracing::warn!(
            "release {}: upload of {} failed after {} attempt(s): {}",
            id,
            path,
            attempts,
            reason
        );
        self.set_status(
            id,
            path,
            FileStatus::Failed {
                reason: reason.clone(),
            },
        )
        .await?;
        Ok(UploadOutcome::Failed { attempts, reason })
    }

    async fn deliver(&self, request: &UploadRequest) -> (CoreResult<()>, u32) {
        self.with_retries(&request.path, || self.job_server.upload(request))
            .await
    }

    /// Calls job-server, retrying transient failures with backoff. Returns the final result
    /// and the number of attempts made.
    async fn with_retries<F, Fut>(&self, what: &str, mut call: F) -> (CoreResult<()>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(()) => return (Ok(()), attempt),
                Err(CoreError::UploadTransientError(msg)) if attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt - 1);
                    tracing::debug!(
                        "upload of {} failed ({}), retry {}/{} after {:?}",
                        what,
                        msg,
                        attempt,
                        max_attempts - 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::releases::ReleaseRequest;
    use crate::workspaces::tests::{proj1, test_config};
    use crate::workspaces::WorkspaceIndex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Job-server stand-in: each path fails with the queued errors, in order, before
    /// succeeding. Records every call. Reviews fail with `review_failures` in the same way.
    #[derive(Default)]
    struct StubJobServer {
        failures: Mutex<HashMap<String, Vec<CoreError>>>,
        calls: Mutex<Vec<String>>,
        review_failures: Mutex<Vec<CoreError>>,
        reviews: Mutex<Vec<ReviewRequest>>,
    }

    impl StubJobServer {
        fn fail(self, path: &str, errors: Vec<CoreError>) -> Self {
            self.failures.lock().insert(path.to_string(), errors);
            self
        }

        fn calls_for(&self, path: &str) -> usize {
            self.calls.lock().iter().filter(|p| *p == path).count()
        }
    }

    #[async_trait]
    impl JobServer for StubJobServer {
        async fn upload(&self, request: &UploadRequest) -> CoreResult<()> {
            assert!(request.absolute.is_file());
            self.calls.lock().push(request.path.clone());
            let mut failures = self.failures.lock();
            match failures.get_mut(&request.path) {
                Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
                _ => Ok(()),
            }
        }

        async fn upload_reviews(&self, request: &ReviewRequest) -> CoreResult<()> {
            self.reviews.lock().push(request.clone());
            let mut failures = self.review_failures.lock();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn server_error() -> CoreError {
        CoreError::UploadTransientError("job-server returned 500: boom".into())
    }

    fn policy(max_attempts: u32) -> UploadPolicy {
        UploadPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO, vec![500..=599]).unwrap()
    }

    fn setup(temp: &TempDir) -> (Arc<ReleaseStore>, ReleaseId) {
        let cfg = test_config(temp);
        let index = Arc::new(WorkspaceIndex::new(cfg.clone()));
        let releases = Arc::new(ReleaseStore::new(cfg, index));
        let release = releases
            .create(&proj1(), &ReleaseRequest::from_paths(["a.csv", "b.txt"]))
            .unwrap();
        (releases, release.id)
    }

    #[tokio::test]
    async fn test_retries_transient_failure_then_completes() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default().fail("b.txt", vec![server_error()]));
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        let report = pipeline.upload(id, "alice").await.unwrap();

        assert_eq!(
            report.files,
            vec![
                FileOutcome {
                    path: "a.csv".into(),
                    outcome: UploadOutcome::Uploaded { attempts: 1 },
                },
                FileOutcome {
                    path: "b.txt".into(),
                    outcome: UploadOutcome::Uploaded { attempts: 2 },
                },
            ]
        );
        assert!(report.summary.complete);
        assert_eq!(report.summary.uploaded, 2);

        let release = releases.get(id).unwrap();
        assert!(release.files.iter().all(|f| f.status == FileStatus::Uploaded));
        assert_eq!(*stub.calls.lock(), vec!["a.csv", "b.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_upload_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default());
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        pipeline.upload(id, "alice").await.unwrap();
        let first = releases.get(id).unwrap();
        let report = pipeline.upload(id, "alice").await.unwrap();

        assert_eq!(releases.get(id).unwrap(), first);
        assert!(report
            .files
            .iter()
            .all(|f| f.outcome == UploadOutcome::AlreadyUploaded));
        assert_eq!(stub.calls_for("a.csv"), 1);
        assert_eq!(stub.calls_for("b.txt"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_failed_and_continue() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(
            StubJobServer::default().fail("a.csv", vec![server_error(), server_error()]),
        );
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(2));

        let report = pipeline.upload(id, "alice").await.unwrap();
        assert!(matches!(
            &report.files[0].outcome,
            UploadOutcome::Failed { attempts: 2, reason } if reason.contains("500")
        ));
        assert_eq!(
            report.files[1].outcome,
            UploadOutcome::Uploaded { attempts: 1 }
        );
        assert_eq!(report.summary.failed, 1);
        assert!(!report.summary.complete);
        assert!(matches!(
            releases.get(id).unwrap().file("a.csv").unwrap().status,
            FileStatus::Failed { .. }
        ));

        // The queue is drained, so a second run succeeds and only retries a.csv.
        let report = pipeline.upload(id, "alice").await.unwrap();
        assert_eq!(
            report.files[0].outcome,
            UploadOutcome::Uploaded { attempts: 1 }
        );
        assert_eq!(report.files[1].outcome, UploadOutcome::AlreadyUploaded);
        assert!(report.summary.complete);
        assert_eq!(stub.calls_for("b.txt"), 1);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default().fail(
            "a.csv",
            vec![CoreError::UploadFatalError("job-server returned 403".into())],
        ));
        let pipeline = UploadPipeline::new(releases, stub.clone(), policy(5));

        let report = pipeline.upload(id, "alice").await.unwrap();
        assert!(matches!(
            report.files[0].outcome,
            UploadOutcome::Failed { attempts: 1, .. }
        ));
        assert_eq!(stub.calls_for("a.csv"), 1);
    }

    #[tokio::test]
    async fn test_unknown_release() {
        let temp = TempDir::new().unwrap();
        let (releases, _) = setup(&temp);
        let pipeline =
            UploadPipeline::new(releases, Arc::new(StubJobServer::default()), policy(1));

        assert!(matches!(
            pipeline.upload(ReleaseId::new(), "alice").await,
            Err(CoreError::ReleaseNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_on_one_release_upload_each_file_once() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default());
        let pipeline = Arc::new(UploadPipeline::new(releases, stub.clone(), policy(3)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.upload(id, "alice").await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().summary.complete);
        }

        assert_eq!(stub.calls_for("a.csv"), 1);
        assert_eq!(stub.calls_for("b.txt"), 1);
        assert!(pipeline.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_release_copy_fails_that_file_only() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let copy = releases.files_guard(id).unwrap().root().join("a.csv");
        std::fs::remove_file(copy).unwrap();
        let stub = Arc::new(StubJobServer::default());
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        let report = pipeline.upload(id, "alice").await.unwrap();

        assert!(matches!(
            &report.files[0].outcome,
            UploadOutcome::Failed { attempts: 0, reason } if reason.contains("a.csv")
        ));
        assert_eq!(
            report.files[1].outcome,
            UploadOutcome::Uploaded { attempts: 1 }
        );
        assert_eq!(stub.calls_for("a.csv"), 0);
        assert_eq!(stub.calls_for("b.txt"), 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.uploaded, 1);
        assert!(matches!(
            releases.get(id).unwrap().file("a.csv").unwrap().status,
            FileStatus::Failed { .. }
        ));
        assert!(pipeline.in_flight.lock().is_empty());
    }

    fn approval(comments: &str) -> Review {
        Review {
            status: ReviewStatus::Approved,
            comments: comments.into(),
            reviewer: Some("bob".into()),
            reviewed_at: chrono::Utc::now(),
        }
    }

    fn review_request(id: ReleaseId, reviews: Vec<(String, Review)>) -> ReviewRequest {
        ReviewRequest {
            workspace: proj1(),
            release_id: id,
            reviews,
            user: "bob".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_reviews_stores_then_forwards() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default());
        stub.review_failures.lock().push(server_error());
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        let request = review_request(id, vec![("a.csv".into(), approval("fine"))]);
        let release = pipeline.submit_reviews(request.clone()).await.unwrap();

        assert_eq!(
            release.file("a.csv").unwrap().review.as_ref(),
            Some(&request.reviews[0].1)
        );
        assert_eq!(*stub.reviews.lock(), vec![request.clone(), request]);
    }

    #[tokio::test]
    async fn test_submit_reviews_with_unknown_path_stores_and_forwards_nothing() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default());
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        let request = review_request(
            id,
            vec![
                ("a.csv".into(), approval("")),
                ("missing.csv".into(), approval("")),
            ],
        );
        assert!(matches!(
            pipeline.submit_reviews(request).await,
            Err(CoreError::FileNotFound(path)) if path == "missing.csv"
        ));
        assert!(stub.reviews.lock().is_empty());
        assert!(releases
            .get(id)
            .unwrap()
            .files
            .iter()
            .all(|f| f.review.is_none()));
    }

    #[tokio::test]
    async fn test_submit_reviews_reports_forwarding_failure() {
        let temp = TempDir::new().unwrap();
        let (releases, id) = setup(&temp);
        let stub = Arc::new(StubJobServer::default());
        stub.review_failures
            .lock()
            .push(CoreError::UploadFatalError("job-server returned 400".into()));
        let pipeline = UploadPipeline::new(releases.clone(), stub.clone(), policy(3));

        let request = review_request(id, vec![("b.txt".into(), approval("ok"))]);
        assert!(matches!(
            pipeline.submit_reviews(request).await,
            Err(CoreError::UploadFatalError(_))
        ));
        assert_eq!(stub.reviews.lock().len(), 1);
        // Stored locally, so the reviewer can resubmit.
        assert!(releases.get(id).unwrap().file("b.txt").unwrap().review.is_some());
    }

    #[test]
    fn test_review_payload_uses_job_server_vocabulary() {
        let mut rejected = approval("needs suppression");
        rejected.status = ReviewStatus::Rejected;
        let reviews = vec![
            ("a.csv".to_string(), approval("")),
            ("out/b.txt".to_string(), rejected),
        ];

        let payload = serde_json::to_value(review_payload(&reviews)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "files": [
                    {"name": "a.csv", "review": {"status": "APPROVED", "comments": ""}},
                    {
                        "name": "out/b.txt",
                        "review": {"status": "REJECTED", "comments": "needs suppression"}
                    },
                ]
            })
        );
    }

    #[test]
    fn test_classifies_statuses_by_policy() {
        let temp = TempDir::new().unwrap();
        let client = JobServerClient::new(&test_config(&temp)).unwrap();

        assert!(matches!(
            client.classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down"),
            CoreError::UploadTransientError(m) if m.contains("503") && m.contains("down")
        ));
        assert!(matches!(
            client.classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            CoreError::UploadTransientError(_)
        ));
        assert!(matches!(
            client.classify_status(reqwest::StatusCode::FORBIDDEN, ""),
            CoreError::UploadFatalError(_)
        ));
        assert_eq!(
            client.url(ReleaseId::parse("0123456789abcdef0123456789abcdef").unwrap()),
            "http://localhost:8000/releases/release/0123456789abcdef0123456789abcdef"
        );
        assert_eq!(
            client.reviews_url(ReleaseId::parse("0123456789abcdef0123456789abcdef").unwrap()),
            "http://localhost:8000/releases/release/0123456789abcdef0123456789abcdef/reviews"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("あいう", 4), "あ");
    }
}
