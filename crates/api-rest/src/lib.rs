//! # API REST
//!
//! REST API implementation for hatch.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation
//! - REST-specific concerns (JSON serialization, CORS, range headers)
//!
//! Uses `api-shared` for authorization and response types, and `hatch-core` for everything
//! that touches the filesystem.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;
pub mod settings;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use hatch_core::{
    CoreConfig, FileServer, JobServer, ReleaseStore, UploadPipeline, WorkspaceIndex,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub use error::ApiError;
pub use settings::Settings;

/// Response header carrying the id of a newly created release.
pub const RELEASE_ID_HEADER: &str = "release-id";

/// How long browsers may cache CORS preflight responses.
const CORS_MAX_AGE: Duration = Duration::from_secs(3200);

/// Application state for the REST API server
///
/// Holds the resolved configuration and the core services shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub index: Arc<WorkspaceIndex>,
    pub releases: Arc<ReleaseStore>,
    pub files: FileServer,
    pub uploads: Arc<UploadPipeline>,
    pub spa_origin: Option<String>,
}

impl AppState {
    pub fn new(
        cfg: Arc<CoreConfig>,
        job_server: Arc<dyn JobServer>,
        spa_origin: Option<String>,
    ) -> Self {
        let index = Arc::new(WorkspaceIndex::new(cfg.clone()));
        let releases = Arc::new(ReleaseStore::new(cfg.clone(), index.clone()));
        let files = FileServer::new(index.clone(), releases.clone());
        let uploads = Arc::new(UploadPipeline::new(
            releases.clone(),
            job_server,
            cfg.upload_policy().clone(),
        ));

        Self {
            cfg,
            index,
            releases,
            files,
            uploads,
            spa_origin,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::workspace_index,
        handlers::workspace_file,
        handlers::create_release,
        handlers::list_releases,
        handlers::release_index,
        handlers::release_file,
        handlers::upload_release,
        handlers::record_reviews,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::FileMetadataRes,
        api_shared::FileListRes,
        api_shared::FileReviewRes,
        api_shared::FileReviewStatus,
        api_shared::ReleaseSummaryRes,
        api_shared::ReleaseRes,
        api_shared::ReleaseListRes,
        api_shared::FileMetadataReq,
        api_shared::ReleaseFilesReq,
        api_shared::CreateReleaseReq,
        api_shared::CreateReleaseRes,
        api_shared::FileReviewReq,
        api_shared::ReviewsReq,
        api_shared::UploadOutcomeRes,
        api_shared::UploadReportRes,
    ))
)]
pub struct ApiDoc;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(state.spa_origin.as_deref());

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .route("/workspace/:workspace/current", get(handlers::workspace_index))
        .route(
            "/workspace/:workspace/current/*path",
            get(handlers::workspace_file),
        )
        .route("/workspace/:workspace/release", post(handlers::create_release))
        .route("/workspace/:workspace/releases", get(handlers::list_releases))
        .route(
            "/workspace/:workspace/release/:release_id",
            get(handlers::release_index).post(handlers::upload_release),
        )
        .route(
            "/workspace/:workspace/release/:release_id/*path",
            get(handlers::release_file),
        )
        .route(
            "/workspace/:workspace/reviews/:release_id",
            post(handlers::record_reviews),
        )
        .layer(cors)
        .with_state(state)
}

/// CORS for the release SPA: it may read files and create releases, send the
/// `Authorization` header, and read the release headers.
fn cors_layer(spa_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(RELEASE_ID_HEADER), header::LOCATION])
        .max_age(CORS_MAX_AGE);

    match spa_origin.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer,
    }
}
