//! HTTP handlers. Each one authorizes the request, then delegates to a core service.
//!
//! Filesystem-heavy core calls (listing, hashing, copying) run on the blocking pool.

use crate::error::ApiError;
use crate::{ApiDoc, AppState, RELEASE_ID_HEADER};
use api_shared::{
    CreateReleaseReq, CreateReleaseRes, FileListRes, FileMetadataRes, HealthRes, HealthService,
    ReleaseListRes, ReleaseRes, ReviewsReq, UploadReportRes,
};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hatch_core::{
    AuthContext, ByteRange, CoreError, CoreResult, FileStream, Release, ReleaseId, ReviewRequest,
    StreamScope, TokenScope, WorkspaceName,
};
use utoipa::OpenApi;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Verifies the token, then parses the workspace segment and checks access to it.
///
/// The token is checked before the segment is looked at, so an unauthenticated caller learns
/// nothing from a malformed path.
fn authorize_workspace(
    state: &AppState,
    headers: &HeaderMap,
    required: TokenScope,
    raw_workspace: &str,
) -> Result<(AuthContext, WorkspaceName), ApiError> {
    let ctx = api_shared::authenticate(state.cfg.token_codec(), bearer(headers))?;
    let workspace = WorkspaceName::new(raw_workspace)
        .map_err(|_| api_shared::reject_malformed(&ctx, "workspace name"))?;
    api_shared::permit(&ctx, required, &workspace, None)?;
    Ok((ctx, workspace))
}

/// [`authorize_workspace`] for a route that also names a release.
///
/// A malformed release id is reported as not found, but only to a caller whose token already
/// reaches the workspace.
fn authorize_release(
    state: &AppState,
    headers: &HeaderMap,
    required: TokenScope,
    raw_workspace: &str,
    raw_release: &str,
) -> Result<(AuthContext, WorkspaceName, ReleaseId), ApiError> {
    let ctx = api_shared::authenticate(state.cfg.token_codec(), bearer(headers))?;
    let workspace = WorkspaceName::new(raw_workspace)
        .map_err(|_| api_shared::reject_malformed(&ctx, "workspace name"))?;
    let Ok(id) = ReleaseId::parse(raw_release) else {
        api_shared::permit(&ctx, required, &workspace, None)?;
        return Err(CoreError::ReleaseNotFound(raw_release.to_string()).into());
    };
    api_shared::permit(&ctx, required, &workspace, Some(id))?;
    Ok((ctx, workspace, id))
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

fn requested_range(headers: &HeaderMap) -> Option<ByteRange> {
    headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse_header)
}

/// `frame-ancestors` policy restricting which origin may embed served files.
fn frame_policy(origin: Option<&str>) -> String {
    match origin {
        Some(origin) => format!("frame-ancestors {origin}"),
        None => "frame-ancestors 'none'".to_string(),
    }
}

fn file_response(stream: FileStream, csp: String) -> Result<Response, ApiError> {
    let (size, range, length, media_type) =
        (stream.size, stream.range, stream.content_length, stream.media_type);

    let mut builder = Response::builder()
        .status(if range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        })
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_SECURITY_POLICY, csp);
    if let Some(range) = range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
    }

    builder
        .body(Body::from_stream(stream.into_stream()))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

fn release_file_list(workspace: &WorkspaceName, release: &Release) -> FileListRes {
    FileListRes {
        files: release
            .files
            .iter()
            .map(|f| {
                let url = format!("/workspace/{}/release/{}/{}", workspace, release.id, f.path);
                FileMetadataRes::from_release_file(f, Some(url))
            })
            .collect(),
        metadata: release.metadata.clone(),
        summary: Some(release.summary().into()),
    }
}

/// Banner naming the backend this instance serves.
pub async fn root(State(state): State<AppState>) -> String {
    format!("hatch release service for backend {}", state.cfg.backend())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/workspace/{workspace}/current",
    params(("workspace" = String, Path, description = "Workspace name")),
    responses(
        (status = 200, description = "Workspace manifest", body = FileListRes),
        (status = 401, description = "Token expired", body = api_shared::ErrorRes),
        (status = 403, description = "Token invalid or not valid for this workspace", body = api_shared::ErrorRes),
        (status = 404, description = "Workspace not found", body = api_shared::ErrorRes)
    )
)]
/// Index of the files currently in a workspace.
#[axum::debug_handler]
pub async fn workspace_index(
    State(state): State<AppState>,
    Path(workspace): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FileListRes>, ApiError> {
    let (_, workspace) = authorize_workspace(&state, &headers, TokenScope::Read, &workspace)?;

    let index = state.index.clone();
    let ws = workspace.clone();
    let files = blocking(move || index.list(&ws)).await?;

    Ok(Json(FileListRes {
        files: files
            .iter()
            .map(|f| {
                let url = format!("/workspace/{}/current/{}", workspace, f.path);
                FileMetadataRes::from_workspace_file(f, Some(url))
            })
            .collect(),
        metadata: None,
        summary: None,
    }))
}

#[utoipa::path(
    get,
    path = "/workspace/{workspace}/current/{path}",
    params(
        ("workspace" = String, Path, description = "Workspace name"),
        ("path" = String, Path, description = "File path within the workspace")
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 206, description = "Requested byte range"),
        (status = 400, description = "Path escapes the workspace", body = api_shared::ErrorRes),
        (status = 404, description = "File not found", body = api_shared::ErrorRes),
        (status = 416, description = "Range not satisfiable", body = api_shared::ErrorRes)
    )
)]
/// Contents of a workspace file, honouring a single `Range` header.
#[axum::debug_handler]
pub async fn workspace_file(
    State(state): State<AppState>,
    Path((workspace, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (_, workspace) = authorize_workspace(&state, &headers, TokenScope::Read, &workspace)?;

    let stream = state
        .files
        .stream(
            StreamScope::Workspace(&workspace),
            &path,
            requested_range(&headers),
        )
        .await?;
    file_response(stream, frame_policy(state.spa_origin.as_deref()))
}

#[utoipa::path(
    post,
    path = "/workspace/{workspace}/release",
    params(("workspace" = String, Path, description = "Workspace name")),
    request_body = CreateReleaseReq,
    responses(
        (status = 201, description = "Release created", body = CreateReleaseRes),
        (status = 400, description = "Invalid selection or file changed since review", body = api_shared::ErrorRes),
        (status = 403, description = "Token lacks upload scope", body = api_shared::ErrorRes),
        (status = 404, description = "Workspace or file not found", body = api_shared::ErrorRes)
    )
)]
/// Snapshots the requested files into a new release.
#[axum::debug_handler]
pub async fn create_release(
    State(state): State<AppState>,
    Path(workspace): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateReleaseReq>,
) -> Result<Response, ApiError> {
    let (ctx, workspace) = authorize_workspace(&state, &headers, TokenScope::Upload, &workspace)?;

    let request = req.into_release_request(&ctx.user);
    let releases = state.releases.clone();
    let ws = workspace.clone();
    let release = blocking(move || releases.create(&ws, &request)).await?;

    let id = release.id.to_string();
    let location = format!("/workspace/{}/release/{}", workspace, id);
    let body = CreateReleaseRes {
        release_id: id.clone(),
        release: release_file_list(&workspace, &release),
    };

    Ok((
        StatusCode::CREATED,
        [
            (HeaderName::from_static(RELEASE_ID_HEADER), id),
            (header::LOCATION, location),
        ],
        Json(body),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/workspace/{workspace}/releases",
    params(("workspace" = String, Path, description = "Workspace name")),
    responses(
        (status = 200, description = "Releases, oldest first", body = ReleaseListRes),
        (status = 403, description = "Token invalid or not valid for this workspace", body = api_shared::ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn list_releases(
    State(state): State<AppState>,
    Path(workspace): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ReleaseListRes>, ApiError> {
    let (_, workspace) = authorize_workspace(&state, &headers, TokenScope::Read, &workspace)?;

    let releases = state.releases.clone();
    let list = blocking(move || releases.list(&workspace)).await?;

    Ok(Json(ReleaseListRes {
        releases: list.iter().map(ReleaseRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/workspace/{workspace}/release/{release_id}",
    params(
        ("workspace" = String, Path, description = "Workspace name"),
        ("release_id" = String, Path, description = "Release id")
    ),
    responses(
        (status = 200, description = "Release manifest with aggregate status", body = FileListRes),
        (status = 404, description = "Release not found", body = api_shared::ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn release_index(
    State(state): State<AppState>,
    Path((workspace, release)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<FileListRes>, ApiError> {
    let (_, workspace, id) =
        authorize_release(&state, &headers, TokenScope::Read, &workspace, &release)?;

    let releases = state.releases.clone();
    let ws = workspace.clone();
    let release = blocking(move || releases.get_in_workspace(&ws, id)).await?;

    Ok(Json(release_file_list(&workspace, &release)))
}

#[utoipa::path(
    get,
    path = "/workspace/{workspace}/release/{release_id}/{path}",
    params(
        ("workspace" = String, Path, description = "Workspace name"),
        ("release_id" = String, Path, description = "Release id"),
        ("path" = String, Path, description = "File path within the release")
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 206, description = "Requested byte range"),
        (status = 404, description = "Release or file not found", body = api_shared::ErrorRes),
        (status = 416, description = "Range not satisfiable", body = api_shared::ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn release_file(
    State(state): State<AppState>,
    Path((workspace, release, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (_, workspace, id) =
        authorize_release(&state, &headers, TokenScope::Read, &workspace, &release)?;

    let stream = state
        .files
        .stream(
            StreamScope::Release(&workspace, id),
            &path,
            requested_range(&headers),
        )
        .await?;
    file_response(stream, frame_policy(Some(state.cfg.job_server_endpoint())))
}

#[utoipa::path(
    post,
    path = "/workspace/{workspace}/release/{release_id}",
    params(
        ("workspace" = String, Path, description = "Workspace name"),
        ("release_id" = String, Path, description = "Release id")
    ),
    responses(
        (status = 200, description = "Per-file upload outcomes", body = UploadReportRes),
        (status = 403, description = "Token lacks upload scope", body = api_shared::ErrorRes),
        (status = 404, description = "Release not found", body = api_shared::ErrorRes)
    )
)]
/// Uploads the release's outstanding files to job-server.
#[axum::debug_handler]
pub async fn upload_release(
    State(state): State<AppState>,
    Path((workspace, release)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<UploadReportRes>, ApiError> {
    let (ctx, workspace, id) =
        authorize_release(&state, &headers, TokenScope::Upload, &workspace, &release)?;

    let releases = state.releases.clone();
    blocking(move || releases.get_in_workspace(&workspace, id)).await?;

    let report = state.uploads.upload(id, &ctx.user).await?;
    Ok(Json(UploadReportRes::from(&report)))
}

#[utoipa::path(
    post,
    path = "/workspace/{workspace}/reviews/{release_id}",
    params(
        ("workspace" = String, Path, description = "Workspace name"),
        ("release_id" = String, Path, description = "Release id")
    ),
    request_body = ReviewsReq,
    responses(
        (status = 200, description = "Release manifest including reviews", body = FileListRes),
        (status = 403, description = "Token lacks upload scope", body = api_shared::ErrorRes),
        (status = 404, description = "Release or file not found; nothing is stored", body = api_shared::ErrorRes),
        (status = 502, description = "Stored, but job-server did not accept the reviews", body = api_shared::ErrorRes)
    )
)]
/// Records reviewer decisions for files in a release, all or none, and forwards them to
/// job-server.
#[axum::debug_handler]
pub async fn record_reviews(
    State(state): State<AppState>,
    Path((workspace, release)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<ReviewsReq>,
) -> Result<Json<FileListRes>, ApiError> {
    let (ctx, workspace, id) =
        authorize_release(&state, &headers, TokenScope::Upload, &workspace, &release)?;

    let releases = state.releases.clone();
    let ws = workspace.clone();
    blocking(move || releases.get_in_workspace(&ws, id)).await?;

    let now = chrono::Utc::now();
    let request = ReviewRequest {
        workspace: workspace.clone(),
        release_id: id,
        reviews: req
            .files
            .into_iter()
            .map(|file| file.into_review(&ctx.user, now))
            .collect(),
        user: ctx.user,
    };
    let release = state.uploads.submit_reviews(request).await?;

    Ok(Json(release_file_list(&workspace, &release)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use async_trait::async_trait;
    use axum::http::Request;
    use axum::Router;
    use hatch_core::{
        CoreConfig, JobServer, ReviewRequest, SigningSecret, UploadPolicy, UploadRequest,
    };
    use http_body_util::BodyExt;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct AcceptAll;

    #[async_trait]
    impl JobServer for AcceptAll {
        async fn upload(&self, _request: &UploadRequest) -> CoreResult<()> {
            Ok(())
        }

        async fn upload_reviews(&self, _request: &ReviewRequest) -> CoreResult<()> {
            Ok(())
        }
    }

    fn setup() -> (TempDir, AppState) {
        let temp = TempDir::new().unwrap();
        let workspaces = temp.path().join("workspaces");
        let releases = temp.path().join("releases");
        fs::create_dir_all(workspaces.join("proj1")).unwrap();
        fs::create_dir_all(&releases).unwrap();
        fs::write(workspaces.join("proj1/a.csv"), "0123456789".repeat(10)).unwrap();
        fs::write(workspaces.join("proj1/b.txt"), "0123456789").unwrap();

        let cfg = CoreConfig::new(
            workspaces,
            releases,
            "https://jobs.example.org".into(),
            &SigningSecret::new("rest-api-test-secret-long-enough"),
            "test".into(),
            UploadPolicy::default(),
        )
        .unwrap();
        let state = AppState::new(
            Arc::new(cfg),
            Arc::new(AcceptAll),
            Some("https://spa.example.org".into()),
        );
        (temp, state)
    }

    fn token(state: &AppState, workspace: &str, scope: TokenScope) -> String {
        state
            .cfg
            .token_codec()
            .issue(
                &WorkspaceName::new(workspace).unwrap(),
                None,
                scope,
                "alice",
                chrono::Duration::hours(1),
            )
            .unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        extra: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_banner() {
        let (_temp, state) = setup();
        let app = router(state);

        let response = send(&app, "GET", "/health", None, &[], None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["ok"], true);

        let response = send(&app, "GET", "/", None, &[], None).await;
        assert!(String::from_utf8(bytes(response).await)
            .unwrap()
            .contains("test"));

        let response = send(&app, "GET", "/api-docs/openapi.json", None, &[], None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json(response).await["paths"]["/workspace/{workspace}/current"].is_object());
    }

    #[tokio::test]
    async fn test_workspace_index_requires_valid_token() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let other = token(&state, "proj2", TokenScope::Read);
        let expired = state
            .cfg
            .token_codec()
            .issue_at(
                &WorkspaceName::new("proj1").unwrap(),
                None,
                TokenScope::Read,
                "alice",
                chrono::Duration::hours(1),
                chrono::Utc::now() - chrono::Duration::hours(2),
            )
            .unwrap();
        let app = router(state);
        let uri = "/workspace/proj1/current";

        assert_eq!(
            send(&app, "GET", uri, None, &[], None).await.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            send(&app, "GET", uri, Some("junk"), &[], None).await.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            send(&app, "GET", uri, Some(other.as_str()), &[], None).await.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            send(&app, "GET", uri, Some(expired.as_str()), &[], None).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let response = send(&app, "GET", uri, Some(read.as_str()), &[], None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["name"], "a.csv");
        assert_eq!(files[0]["size"], 100);
        assert_eq!(files[0]["url"], "/workspace/proj1/current/a.csv");
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_not_found() {
        let (_temp, state) = setup();
        let read = token(&state, "nope", TokenScope::Read);
        let app = router(state);

        let response = send(&app, "GET", "/workspace/nope/current", Some(read.as_str()), &[], None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_workspace_file_full_and_ranged() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let app = router(state);
        let uri = "/workspace/proj1/current/a.csv";

        let response = send(&app, "GET", uri, Some(read.as_str()), &[], None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_SECURITY_POLICY],
            "frame-ancestors https://spa.example.org"
        );
        assert_eq!(bytes(response).await.len(), 100);

        let response = send(&app, "GET", uri, Some(read.as_str()), &[("range", "bytes=0-49")], None).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-49/100");
        assert_eq!(bytes(response).await, "0123456789".repeat(5).into_bytes());

        let response =
            send(&app, "GET", uri, Some(read.as_str()), &[("range", "bytes=50-149")], None).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");

        let response =
            send(&app, "GET", uri, Some(read.as_str()), &[("range", "bytes=0-1,5-6")], None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_workspace_file_rejects_traversal() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let app = router(state);

        let response = send(
            &app,
            "GET",
            "/workspace/proj1/current/../../etc/passwd",
            Some(read.as_str()),
            &[],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            send(&app, "GET", "/workspace/proj1/current/missing.csv", Some(read.as_str()), &[], None)
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_release_lifecycle() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let upload = token(&state, "proj1", TokenScope::Upload);
        let app = router(state);
        let request = serde_json::json!({"files": [{"name": "a.csv"}, {"name": "b.txt"}]});

        let response = send(
            &app,
            "POST",
            "/workspace/proj1/release",
            Some(read.as_str()),
            &[],
            Some(request.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            "POST",
            "/workspace/proj1/release",
            Some(upload.as_str()),
            &[],
            Some(request),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = response.headers()[RELEASE_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("/workspace/proj1/release/{id}").as_str()
        );

        let release_uri = format!("/workspace/proj1/release/{id}");
        let body = json(send(&app, "GET", &release_uri, Some(read.as_str()), &[], None).await).await;
        assert_eq!(body["summary"]["pending"], 2);
        assert_eq!(body["files"][1]["status"], "pending");

        let response = send(
            &app,
            "GET",
            &format!("{release_uri}/b.txt"),
            Some(read.as_str()),
            &[],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(bytes(response).await, b"0123456789");

        let response = send(&app, "POST", &release_uri, Some(upload.as_str()), &[], None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json(response).await;
        assert_eq!(report["summary"]["complete"], true);
        assert_eq!(report["files"][0]["outcome"], "uploaded");

        let listed = json(
            send(&app, "GET", "/workspace/proj1/releases", Some(read.as_str()), &[], None).await,
        )
        .await;
        assert_eq!(listed["releases"][0]["id"], id.as_str());
        assert_eq!(listed["releases"][0]["summary"]["complete"], true);

        let response = send(
            &app,
            "POST",
            &format!("/workspace/proj1/reviews/{id}"),
            Some(upload.as_str()),
            &[],
            Some(serde_json::json!({
                "files": [{"name": "a.csv", "review": {"status": "APPROVED", "comments": "ok"}}]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["files"][0]["review"]["status"], "APPROVED");
    }

    #[tokio::test]
    async fn test_release_errors() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let upload = token(&state, "proj1", TokenScope::Upload);
        let app = router(state);

        let response = send(
            &app,
            "POST",
            "/workspace/proj1/release",
            Some(upload.as_str()),
            &[],
            Some(serde_json::json!({"files": []})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            "POST",
            "/workspace/proj1/release",
            Some(upload.as_str()),
            &[],
            Some(serde_json::json!({"files": {"a.csv": "not-the-hash"}})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let missing = ReleaseId::new();
        let response = send(
            &app,
            "GET",
            &format!("/workspace/proj1/release/{missing}"),
            Some(read.as_str()),
            &[],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &app,
            "GET",
            "/workspace/proj1/release/not-an-id",
            Some(read.as_str()),
            &[],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_paths_are_checked_after_authentication() {
        let (_temp, state) = setup();
        let read = token(&state, "proj1", TokenScope::Read);
        let release_scoped = state
            .cfg
            .token_codec()
            .issue(
                &WorkspaceName::new("proj1").unwrap(),
                Some(ReleaseId::new()),
                TokenScope::Read,
                "alice",
                chrono::Duration::hours(1),
            )
            .unwrap();
        let app = router(state);

        for uri in ["/workspace/.hidden/current", "/workspace/proj1/release/not-an-id"] {
            let response = send(&app, "GET", uri, None, &[], None).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        }

        let response =
            send(&app, "GET", "/workspace/.hidden/current", Some(read.as_str()), &[], None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            "GET",
            "/workspace/proj1/release/not-an-id",
            Some(release_scoped.as_str()),
            &[],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reviews_are_all_or_nothing() {
        let (_temp, state) = setup();
        let upload = token(&state, "proj1", TokenScope::Upload);
        let app = router(state);

        let response = send(
            &app,
            "POST",
            "/workspace/proj1/release",
            Some(upload.as_str()),
            &[],
            Some(serde_json::json!({"files": [{"name": "a.csv"}]})),
        )
        .await;
        let id = response.headers()[RELEASE_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();

        let response = send(
            &app,
            "POST",
            &format!("/workspace/proj1/reviews/{id}"),
            Some(upload.as_str()),
            &[],
            Some(serde_json::json!({
                "files": [
                    {"name": "a.csv", "review": {"status": "APPROVED", "comments": ""}},
                    {"name": "missing.csv", "review": {"status": "REJECTED", "comments": ""}}
                ]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json(
            send(
                &app,
                "GET",
                &format!("/workspace/proj1/release/{id}"),
                Some(upload.as_str()),
                &[],
                None,
            )
            .await,
        )
        .await;
        assert!(body["files"][0]["review"].is_null());
    }

    #[tokio::test]
    async fn test_not_found_body_names_relative_path_only() {
        let (temp, state) = setup();
        fs::create_dir_all(temp.path().join("workspaces/proj1/output")).unwrap();
        fs::write(temp.path().join("workspaces/proj1/output/c.csv"), "c").unwrap();
        let read = token(&state, "proj1", TokenScope::Read);
        let app = router(state);

        let response =
            send(&app, "GET", "/workspace/proj1/current/output", Some(read.as_str()), &[], None)
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = String::from_utf8(bytes(response).await).unwrap();
        assert!(body.contains("output"));
        assert!(!body.contains(&temp.path().display().to_string()));
    }
}
